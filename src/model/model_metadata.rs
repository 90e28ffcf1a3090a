//! モデルメタデータの定義と永続化
//!
//! tar.gz形式でモデルと関連するメタデータを保存・読み込みします。
//! カテゴリ順序はここに明示的に保存し、推論時はこれを正とします。

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::labels::Categories;

/// モデルメタデータ
///
/// tar.gz形式で保存される情報：
/// - metadata.json: このメタデータ（JSON形式）
/// - model.bin: モデルの重み（バイナリ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// 全カテゴリ（モデル出力インデックスの順）
    /// 例: ["affenpinscher", "afghan_hound", ..., "yorkshire_terrier"]
    pub categories: Categories,

    /// モデル入力サイズ（正方形、通常160）
    pub model_input_size: u32,

    /// 全結合層のユニット数
    pub hidden_units: usize,

    /// 特徴抽出器の基本チャンネル数
    #[serde(default = "default_base_channels")]
    pub base_channels: usize,

    /// 学習サンプル数（学習 + 検証）
    #[serde(default)]
    pub num_samples: usize,

    /// 学習エポック数
    pub num_epochs: u32,

    /// 事前学習済み特徴抽出器を凍結して学習したか
    #[serde(default)]
    pub frozen_backbone: bool,

    /// モデルの学習時刻（ISO8601形式）
    pub trained_at: String,
}

fn default_base_channels() -> usize {
    32
}

impl ModelMetadata {
    /// 新しいメタデータを作成
    pub fn new(
        categories: Categories,
        model_input_size: u32,
        hidden_units: usize,
        base_channels: usize,
        num_samples: usize,
        num_epochs: u32,
        frozen_backbone: bool,
    ) -> Self {
        let trained_at = chrono::Local::now().to_rfc3339();

        Self {
            categories,
            model_input_size,
            hidden_units,
            base_channels,
            num_samples,
            num_epochs,
            frozen_backbone,
            trained_at,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.categories.len()
    }

    /// メタデータをJSON文字列に変換
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON文字列からメタデータを生成
    pub fn from_json_string(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
