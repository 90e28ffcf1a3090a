//! 起動時に一度だけ構築する読み取り専用のアプリケーション状態

use std::sync::Arc;

use crate::breed_info::BreedInfoStore;
use crate::error::Result;
use crate::labels::{load_labels, Categories};
use crate::ml::{load_engine, BreedModel};
use crate::model::AppConfig;

/// 全リクエストで共有する状態（起動後は変更しない）
pub struct AppState {
    model: Arc<dyn BreedModel>,
    breed_info: BreedInfoStore,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(model: Arc<dyn BreedModel>, breed_info: BreedInfoStore) -> Self {
        Self { model, breed_info }
    }

    /// 設定に従って成果物を読み込む
    ///
    /// 成果物の欠落、またはラベルファイルとモデルのカテゴリ順序の不一致は起動エラー。
    pub fn load(config: &AppConfig) -> Result<Self> {
        let artifacts = &config.artifacts;

        let model = load_engine(config.device_type, &artifacts.model_path)?;

        let labels = load_labels(&artifacts.labels_path)?;
        let from_labels = Categories::from_labels(&labels);
        model.categories().ensure_matches(&from_labels)?;

        let breed_info = BreedInfoStore::load(&artifacts.breed_info_path)?;
        let missing = model
            .categories()
            .as_slice()
            .iter()
            .filter(|breed| !breed_info.contains(breed))
            .count();
        if missing > 0 {
            tracing::warn!(missing, "犬種情報が無いカテゴリがあります");
        }

        tracing::info!(
            categories = model.categories().len(),
            breed_info = breed_info.len(),
            input_size = model.input_size(),
            "成果物を読み込みました"
        );

        Ok(Self::new(model, breed_info))
    }

    pub fn model(&self) -> &dyn BreedModel {
        self.model.as_ref()
    }

    pub fn breed_info(&self) -> &BreedInfoStore {
        &self.breed_info
    }
}
