//! モデル推論機能

use burn::tensor::{backend::Backend, Tensor};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{PawError, Result};
use crate::labels::Categories;
use crate::ml::{BreedClassifier, ModelConfig};
use crate::model::{load_model_with_metadata, log_metadata_info, ModelMetadata};
use crate::preprocess::ImageBatch;

/// 推論操作の抽象
///
/// サービスはこのトレイト越しにモデルを呼び出すため、バックエンドに依存しません。
pub trait BreedModel: Send + Sync {
    /// 期待する入力サイズ（正方形）
    fn input_size(&self) -> u32;

    /// 出力インデックスの順に並んだカテゴリ
    fn categories(&self) -> &Categories;

    /// (N, H, W, 3) のバッチから N 行の確率ベクトルを返す
    fn predict(&self, batch: &ImageBatch) -> Result<Vec<Vec<f32>>>;
}

/// 推論エンジン
pub struct InferenceEngine<B: Backend> {
    // burn のモジュールは Sync ではないため、リクエストごとに複製して使う
    model: Mutex<BreedClassifier<B>>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> InferenceEngine<B> {
    /// モデルバンドルを読み込んで推論エンジンを初期化
    pub fn load<P: AsRef<Path>>(model_path: P, device: B::Device) -> Result<Self> {
        let (metadata, model_binary) = load_model_with_metadata(model_path.as_ref())?;
        log_metadata_info(&metadata);

        let model = ModelConfig::new(metadata.num_classes())
            .with_hidden_units(metadata.hidden_units)
            .with_image_size(metadata.model_input_size as usize)
            .with_base_channels(metadata.base_channels)
            .with_dropout(0.0) // 推論時はドロップアウトなし
            .init::<B>(&device)
            .load_bytes(model_binary, &device)?;

        Ok(Self::from_model(model, metadata, device))
    }

    /// 初期化済みのモデルから推論エンジンを作成
    pub fn from_model(model: BreedClassifier<B>, metadata: ModelMetadata, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            metadata,
            device,
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn snapshot(&self) -> Result<BreedClassifier<B>> {
        self.model
            .lock()
            .map(|model| model.clone())
            .map_err(|_| PawError::Model("model lock poisoned".to_string()))
    }
}

impl<B: Backend> BreedModel for InferenceEngine<B> {
    fn input_size(&self) -> u32 {
        self.metadata.model_input_size
    }

    fn categories(&self) -> &Categories {
        &self.metadata.categories
    }

    fn predict(&self, batch: &ImageBatch) -> Result<Vec<Vec<f32>>> {
        let [n, h, w, c] = batch.dims();
        let size = self.input_size() as usize;
        if h != size || w != size {
            return Err(PawError::shape_mismatch(
                format!("[{}, {}, {}, {}]", n, size, size, c),
                format!("[{}, {}, {}, {}]", n, h, w, c),
            ));
        }

        let model = self.snapshot()?;

        let tensor = Tensor::<B, 1>::from_floats(batch.as_slice(), &self.device).reshape([n, h, w, c]);
        let output = model.probabilities(tensor);

        let num_classes = self.metadata.num_classes();
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PawError::Model(format!("推論結果の取得エラー: {:?}", e)))?;
        if values.len() != n * num_classes {
            return Err(PawError::shape_mismatch(
                format!("{} values", n * num_classes),
                format!("{} values", values.len()),
            ));
        }

        Ok(values.chunks(num_classes).map(<[f32]>::to_vec).collect())
    }
}
