//! 犬種判定: データ準備・学習・推論APIサーバー

pub mod error;
pub mod logging;

// 成果物とデータ
pub mod labels;
pub mod breed_info;
pub mod csv_loader;
pub mod dataset;

// 画像処理と推論結果
pub mod preprocess;
pub mod prediction;

pub mod model;
pub mod ml;
pub mod server;

pub use error::{PawError, Result};
pub use labels::Categories;
pub use model::AppConfig;
