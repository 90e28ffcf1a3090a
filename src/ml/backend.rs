//! 計算デバイスごとのバックエンド選択

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn_autodiff::Autodiff;
use burn_ndarray::{NdArray, NdArrayDevice};

use crate::error::Result;
use crate::ml::{train_model, BreedModel, InferenceEngine, TrainingRequest};
use crate::model::DeviceType;

/// 推論エンジンを指定デバイスで読み込む
pub fn load_engine(device_type: DeviceType, model_path: &Path) -> Result<Arc<dyn BreedModel>> {
    tracing::info!(device = %device_type, path = %model_path.display(), "モデルを読み込みます");
    match device_type {
        DeviceType::Cpu => Ok(Arc::new(InferenceEngine::<NdArray>::load(
            model_path,
            NdArrayDevice::Cpu,
        )?)),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => Ok(Arc::new(InferenceEngine::<burn::backend::Wgpu>::load(
            model_path,
            burn_wgpu::WgpuDevice::default(),
        )?)),
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => Err(crate::error::PawError::Model(
            "this build does not include the wgpu backend".to_string(),
        )),
    }
}

/// 指定デバイスで学習を実行
pub fn train_on(device_type: DeviceType, request: &TrainingRequest) -> anyhow::Result<PathBuf> {
    tracing::info!(device = %device_type, "学習デバイス");
    match device_type {
        DeviceType::Cpu => train_model::<Autodiff<NdArray>>(request, NdArrayDevice::Cpu),
        #[cfg(feature = "wgpu")]
        DeviceType::Wgpu => {
            train_model::<Autodiff<burn::backend::Wgpu>>(request, burn_wgpu::WgpuDevice::DiscreteGpu(0))
        }
        #[cfg(not(feature = "wgpu"))]
        DeviceType::Wgpu => Err(crate::error::PawError::Model(
            "this build does not include the wgpu backend".to_string(),
        )
        .into()),
    }
}
