//! 機械学習モデルの共通定義
//!
//! 犬種分類用のモデル（特徴抽出器 + 全結合2層）と関連する設定を提供します。

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        loss::CrossEntropyLossConfig,
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    record::{BinBytesRecorder, BinFileRecorder, FullPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::Backend, Int, Tensor},
    train::ClassificationOutput,
};
use std::path::Path;

use crate::error::PawError;

/// 特徴抽出器の各段の (チャンネル倍率, ストライド)
const STAGES: [(usize, usize); 6] = [(2, 1), (4, 2), (4, 1), (8, 2), (8, 1), (16, 2)];

/// 特徴ベクトル次元の倍率（base_channels x 40、既定で1280次元）
const FEATURE_MULTIPLIER: usize = 40;

/// モデル設定
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 分類クラス数
    pub num_classes: usize,
    /// 全結合層のユニット数
    #[config(default = 256)]
    pub hidden_units: usize,
    /// ドロップアウト率
    #[config(default = 0.0)]
    pub dropout: f64,
    /// 入力画像サイズ（正方形）
    #[config(default = 160)]
    pub image_size: usize,
    /// 特徴抽出器の基本チャンネル数
    #[config(default = 32)]
    pub base_channels: usize,
}

impl ModelConfig {
    /// 特徴ベクトルの次元
    pub fn feature_dim(&self) -> usize {
        self.base_channels * FEATURE_MULTIPLIER
    }

    /// モデルを初期化
    pub fn init<B: Backend>(&self, device: &B::Device) -> BreedClassifier<B> {
        let feature_dim = self.feature_dim();
        tracing::debug!(
            image_size = self.image_size,
            base_channels = self.base_channels,
            feature_dim,
            hidden_units = self.hidden_units,
            num_classes = self.num_classes,
            "モデル構成"
        );

        BreedClassifier {
            backbone: self.init_backbone(device),
            fc1: LinearConfig::new(feature_dim, self.hidden_units).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc2: LinearConfig::new(self.hidden_units, self.num_classes).init(device),
            activation: Relu::new(),
        }
    }

    fn init_backbone<B: Backend>(&self, device: &B::Device) -> FeatureExtractor<B> {
        let base = self.base_channels;

        let mut blocks = Vec::with_capacity(STAGES.len());
        let mut channels = base;
        for (multiplier, stride) in STAGES {
            let out = base * multiplier;
            blocks.push(SeparableBlock {
                depthwise: Conv2dConfig::new([channels, channels], [3, 3])
                    .with_stride([stride, stride])
                    .with_padding(PaddingConfig2d::Explicit(1, 1))
                    .with_groups(channels)
                    .init(device),
                pointwise: Conv2dConfig::new([channels, out], [1, 1]).init(device),
                activation: Relu::new(),
            });
            channels = out;
        }

        FeatureExtractor {
            // Stem: 3x3 stride 2
            stem: Conv2dConfig::new([3, base], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            blocks,
            head: Conv2dConfig::new([channels, self.feature_dim()], [1, 1]).init(device),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            activation: Relu::new(),
        }
    }
}

/// 深さ方向分離畳み込みブロック（depthwise 3x3 + pointwise 1x1）
#[derive(Module, Debug)]
pub struct SeparableBlock<B: Backend> {
    depthwise: Conv2d<B>,
    pointwise: Conv2d<B>,
    activation: Relu,
}

impl<B: Backend> SeparableBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.activation.forward(self.depthwise.forward(x));
        self.activation.forward(self.pointwise.forward(x))
    }
}

/// 特徴抽出器
///
/// # アーキテクチャ
/// - Stem: Conv 3x3 stride 2 + ReLU
/// - 分離畳み込みブロック x 6（うち3つが stride 2）
/// - Conv 1x1 -> feature_dim + ReLU
/// - Global Average Pooling
#[derive(Module, Debug)]
pub struct FeatureExtractor<B: Backend> {
    stem: Conv2d<B>,
    blocks: Vec<SeparableBlock<B>>,
    head: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    activation: Relu,
}

impl<B: Backend> FeatureExtractor<B> {
    /// # 引数
    /// - `images`: [batch_size, 3, H, W]
    ///
    /// # 戻り値
    /// - 特徴ベクトル [batch_size, feature_dim]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.activation.forward(self.stem.forward(images));
        for block in &self.blocks {
            x = block.forward(x);
        }
        let x = self.activation.forward(self.head.forward(x));
        let x = self.pool.forward(x);

        let [batch_size, channels, _, _] = x.dims();
        x.reshape([batch_size, channels])
    }
}

/// 犬種分類モデル
///
/// 入力は (N, H, W, 3) の正規化済みRGB画像。内部で (N, 3, H, W) に並べ替えます。
///
/// # アーキテクチャ
/// - 特徴抽出器（事前学習済みの重みを読み込んだ場合は学習時に凍結）
/// - FC: feature_dim -> hidden_units + ReLU
/// - FC: hidden_units -> num_classes
/// - Softmax (分類時)
#[derive(Module, Debug)]
pub struct BreedClassifier<B: Backend> {
    backbone: FeatureExtractor<B>,
    fc1: Linear<B>,
    dropout: Dropout,
    fc2: Linear<B>,
    activation: Relu,
}

impl<B: Backend> BreedClassifier<B> {
    /// 順伝播
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, H, W, 3]
    ///
    /// # 戻り値
    /// - クラスごとのロジット [batch_size, num_classes]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = images.permute([0, 3, 1, 2]);
        let features = self.backbone.forward(x);

        let x = self.fc1.forward(features);
        let x = self.activation.forward(x);
        let x = self.dropout.forward(x);

        self.fc2.forward(x)
    }

    /// クラスごとの確率 [batch_size, num_classes]
    pub fn probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    /// 順伝播と損失計算（学習用）
    ///
    /// # 引数
    /// - `images`: バッチ画像 [batch_size, H, W, 3]
    /// - `targets`: ターゲットラベル [batch_size]
    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        let output = self.forward(images);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), targets.clone());

        ClassificationOutput::new(loss, output, targets)
    }

    /// 特徴抽出器の重みを読み込む
    pub fn load_backbone(mut self, path: &Path, device: &B::Device) -> crate::error::Result<Self> {
        if !path.exists() {
            return Err(PawError::missing("backbone weights", path));
        }
        let record = BinFileRecorder::<FullPrecisionSettings>::new()
            .load(path.to_path_buf(), device)
            .map_err(|e| PawError::Model(format!("特徴抽出器の重みの読み込みエラー: {:?}", e)))?;
        self.backbone = self.backbone.load_record(record);
        Ok(self)
    }

    /// 特徴抽出器の重みをファイルに保存（次回学習の初期値用）
    pub fn save_backbone(&self, path: &Path) -> crate::error::Result<()> {
        self.backbone
            .clone()
            .save_file(path.to_path_buf(), &BinFileRecorder::<FullPrecisionSettings>::new())
            .map_err(|e| PawError::Model(format!("特徴抽出器の保存エラー: {:?}", e)))
    }

    /// 特徴抽出器を凍結（勾配を計算しない）
    pub fn freeze_backbone(mut self) -> Self {
        self.backbone = self.backbone.no_grad();
        self
    }

    /// 重みをバイト列に変換
    pub fn to_bytes(self) -> crate::error::Result<Vec<u8>> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.into_record(), ())
            .map_err(|e| PawError::Model(format!("モデル重みの書き出しエラー: {:?}", e)))
    }

    /// バイト列から重みを復元
    pub fn load_bytes(self, bytes: Vec<u8>, device: &B::Device) -> crate::error::Result<Self> {
        let record = BinBytesRecorder::<FullPrecisionSettings>::default()
            .load(bytes, device)
            .map_err(|e| PawError::Model(format!("モデル重みの読み込みエラー: {:?}", e)))?;
        Ok(self.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn tiny_config() -> ModelConfig {
        ModelConfig::new(5)
            .with_image_size(32)
            .with_base_channels(2)
            .with_hidden_units(8)
    }

    #[test]
    fn output_shape_matches_classes() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::zeros([2, 32, 32, 3], &device);
        assert_eq!(model.forward(images).dims(), [2, 5]);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([1, 32, 32, 3], &device);
        let probs = model.probabilities(images).into_data().to_vec::<f32>().unwrap();
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
    }

    #[test]
    fn weights_round_trip_through_bytes() {
        let device = Default::default();
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);
        let images = Tensor::<TestBackend, 4>::ones([1, 32, 32, 3], &device);
        let expected = model.forward(images.clone()).into_data().to_vec::<f32>().unwrap();

        let bytes = model.to_bytes().unwrap();
        let restored = config
            .init::<TestBackend>(&device)
            .load_bytes(bytes, &device)
            .unwrap();
        let actual = restored.forward(images).into_data().to_vec::<f32>().unwrap();
        assert_eq!(expected, actual);
    }

    #[test]
    fn backbone_round_trip_through_file() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backbone");
        let config = tiny_config();
        let model = config.init::<TestBackend>(&device);
        model.save_backbone(&path).unwrap();

        let saved = path.with_extension("bin");
        let reloaded = config.init::<TestBackend>(&device).load_backbone(&saved, &device);
        assert!(reloaded.is_ok());
    }
}
