//! モデル学習機能

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{
        backend::{AutodiffBackend, Backend},
        Int, Tensor,
    },
    train::{
        checkpoint::{CheckpointingAction, CheckpointingStrategy, MetricCheckpointingStrategy},
        metric::store::{Aggregate, Direction, EventStoreClient, Split},
        ClassificationOutput, TrainOutput, TrainStep, ValidStep,
    },
};

use crate::dataset::PreparedDataset;
use crate::labels::Categories;
use crate::ml::{BreedClassifier, ModelConfig};
use crate::model::config::{ModelSettings, TrainingSettings};
use crate::model::{save_model_with_metadata, ModelMetadata};
use crate::preprocess::CHANNELS;

/// 学習データセット（前処理済みデータへのインデックスのみ保持）
#[derive(Clone)]
pub struct BreedDataset {
    data: Arc<PreparedDataset>,
    targets: Arc<Vec<usize>>,
    indices: Vec<usize>,
}

impl BreedDataset {
    /// 前処理済みデータセットとカテゴリからデータセットを作成
    pub fn new(data: PreparedDataset, categories: &Categories) -> crate::error::Result<Self> {
        let targets = categories.encode(data.labels())?;
        let indices = (0..data.len()).collect();
        Ok(Self {
            data: Arc::new(data),
            targets: Arc::new(targets),
            indices,
        })
    }

    pub fn image_size(&self) -> usize {
        self.data.image_size() as usize
    }

    /// データセットを学習用と検証用に分割
    ///
    /// シード付きでシャッフルし、検証用には ceil(total * validation_ratio) 件を割り当てます。
    pub fn split(self, validation_ratio: f32, seed: u64) -> (Self, Self) {
        use rand::seq::SliceRandom;
        use rand::SeedableRng;

        let mut indices = self.indices;
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let total_len = indices.len();
        let val_len = ((total_len as f32 * validation_ratio).ceil() as usize).min(total_len);
        let val_indices = indices.split_off(total_len - val_len);

        let train_dataset = Self {
            data: Arc::clone(&self.data),
            targets: Arc::clone(&self.targets),
            indices,
        };
        let val_dataset = Self {
            data: self.data,
            targets: self.targets,
            indices: val_indices,
        };

        (train_dataset, val_dataset)
    }
}

/// データセットアイテム
#[derive(Clone, Debug)]
pub struct BreedItem {
    /// (H, W, 3) の 8bit RGB
    pub pixels: Vec<u8>,
    pub label: usize,
}

impl Dataset<BreedItem> for BreedDataset {
    fn get(&self, index: usize) -> Option<BreedItem> {
        let actual_index = *self.indices.get(index)?;
        Some(BreedItem {
            pixels: self.data.pixels(actual_index)?.to_vec(),
            label: self.targets[actual_index],
        })
    }

    fn len(&self) -> usize {
        self.indices.len()
    }
}

/// バッチャー
#[derive(Clone)]
pub struct BreedBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

impl<B: Backend> BreedBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

/// バッチデータ
#[derive(Clone, Debug)]
pub struct BreedBatch<B: Backend> {
    /// [batch_size, H, W, 3]
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> Batcher<B, BreedItem, BreedBatch<B>> for BreedBatcher<B> {
    fn batch(&self, items: Vec<BreedItem>, _device: &B::Device) -> BreedBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;
        let mut all_pixels = Vec::with_capacity(batch_size * size * size * CHANNELS);
        let mut targets_vec = Vec::with_capacity(batch_size);

        for item in items {
            all_pixels.extend(item.pixels.iter().map(|&p| p as f32 / 255.0));
            targets_vec.push(item.label as i64);
        }

        // 1回の転送でバッチ全体をデバイスへ
        let images = Tensor::<B, 1>::from_floats(all_pixels.as_slice(), &self.device)
            .reshape([batch_size, size, size, CHANNELS]);
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), &self.device);

        BreedBatch { images, targets }
    }
}

/// TrainStep実装 (学習時の順伝播 + 逆伝播)
impl<B: AutodiffBackend> TrainStep<BreedBatch<B>, ClassificationOutput<B>> for BreedClassifier<B> {
    fn step(&self, batch: BreedBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
        let item = self.forward_classification(batch.images, batch.targets);
        let grads = item.loss.backward();
        TrainOutput::new(self, grads, item)
    }
}

/// ValidStep実装 (検証時の順伝播のみ)
impl<B: Backend> ValidStep<BreedBatch<B>, ClassificationOutput<B>> for BreedClassifier<B> {
    fn step(&self, batch: BreedBatch<B>) -> ClassificationOutput<B> {
        self.forward_classification(batch.images, batch.targets)
    }
}

/// 実行済みエポック数と保存済みの最良エポック
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EpochProgress {
    pub completed: usize,
    pub best: Option<usize>,
}

/// 検証lossが最小のエポックのみチェックポイントを残し、進捗を記録する
pub struct BestEpochCheckpointing {
    inner: MetricCheckpointingStrategy,
    progress: Arc<Mutex<EpochProgress>>,
}

impl BestEpochCheckpointing {
    pub fn new(inner: MetricCheckpointingStrategy, progress: Arc<Mutex<EpochProgress>>) -> Self {
        Self { inner, progress }
    }
}

impl CheckpointingStrategy for BestEpochCheckpointing {
    fn checkpointing(&mut self, epoch: usize, store: &EventStoreClient) -> Vec<CheckpointingAction> {
        let actions = self.inner.checkpointing(epoch, store);
        if let Ok(mut progress) = self.progress.lock() {
            progress.completed = epoch;
            if actions.contains(&CheckpointingAction::Save) {
                progress.best = Some(epoch);
            }
        }
        actions
    }
}

/// 学習の入力と出力先
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    /// prepare が出力したディレクトリ
    pub data_dir: PathBuf,
    /// モデルバンドルの保存先
    pub output_model_path: PathBuf,
    /// 学習済み特徴抽出器の書き出し先（任意）
    pub export_backbone: Option<PathBuf>,
    pub model: ModelSettings,
    pub training: TrainingSettings,
}

/// モデル学習を実行し、保存したバンドルのパスを返す
pub fn train_model<B: AutodiffBackend>(request: &TrainingRequest, device: B::Device) -> Result<PathBuf> {
    use burn::{
        data::dataloader::DataLoaderBuilder,
        optim::AdamConfig,
        train::{
            metric::{AccuracyMetric, LossMetric},
            LearnerBuilder, LearningStrategy, MetricEarlyStoppingStrategy, StoppingCondition,
        },
    };

    let settings = &request.training;

    let prepared = PreparedDataset::load(&request.data_dir)
        .with_context(|| format!("前処理済みデータの読み込みに失敗: {}", request.data_dir.display()))?;
    if prepared.is_empty() {
        anyhow::bail!("学習データが見つかりません: {}", request.data_dir.display());
    }
    let image_size = prepared.image_size();
    if image_size != request.model.input_size {
        anyhow::bail!(
            "前処理済み画像のサイズ {}x{} が設定 {}x{} と一致しません",
            image_size,
            image_size,
            request.model.input_size,
            request.model.input_size
        );
    }

    // カテゴリ順序: ソート済み・重複なしのラベル（このままバンドルに保存）
    let categories = Categories::from_labels(prepared.labels());
    let total_samples = prepared.len();
    tracing::info!(
        samples = total_samples,
        classes = categories.len(),
        image_size,
        "データセットを読み込みました"
    );

    let dataset = BreedDataset::new(prepared, &categories)?;
    let (dataset_train, dataset_val) = dataset.split(settings.validation_ratio, settings.seed);
    tracing::info!(train = dataset_train.len(), valid = dataset_val.len(), "データを分割しました");

    let model_config = ModelConfig::new(categories.len())
        .with_hidden_units(request.model.hidden_units)
        .with_dropout(request.model.dropout)
        .with_image_size(image_size as usize)
        .with_base_channels(request.model.base_channels);

    let mut model = model_config.init::<B>(&device);
    let frozen_backbone = match &request.model.backbone_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "事前学習済み特徴抽出器を読み込み、凍結します");
            model = model.load_backbone(path, &device)?.freeze_backbone();
            true
        }
        None => {
            tracing::warn!("特徴抽出器の重みが指定されていないため、全層を学習します");
            false
        }
    };

    let batcher_train = BreedBatcher::<B>::new(device.clone(), image_size as usize);
    let batcher_val = BreedBatcher::<B::InnerBackend>::new(device.clone(), image_size as usize);

    let dataloader_train = DataLoaderBuilder::new(batcher_train)
        .batch_size(settings.batch_size)
        .shuffle(settings.seed)
        .num_workers(settings.num_workers)
        .build(dataset_train);

    let dataloader_val = DataLoaderBuilder::new(batcher_val)
        .batch_size(settings.batch_size)
        .num_workers(settings.num_workers)
        .build(dataset_val);

    // 学習ログとチェックポイントは実行ごとの一時ディレクトリへ（失敗時も削除される）
    let artifact_dir = tempfile::Builder::new().prefix("pawdentify_training").tempdir()?;
    let checkpoint_dir = artifact_dir.path().join("checkpoint");

    tracing::info!(
        epochs = settings.num_epochs,
        batch_size = settings.batch_size,
        learning_rate = settings.learning_rate,
        patience = settings.early_stopping_patience,
        "学習を開始します"
    );

    let progress = Arc::new(Mutex::new(EpochProgress::default()));
    let learner = LearnerBuilder::new(artifact_dir.path())
        .metric_train_numeric(AccuracyMetric::new())
        .metric_valid_numeric(AccuracyMetric::new())
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .with_file_checkpointer(BinFileRecorder::<FullPrecisionSettings>::new())
        .with_checkpointing_strategy(BestEpochCheckpointing::new(
            MetricCheckpointingStrategy::new(
                &LossMetric::<B>::new(),
                Aggregate::Mean,
                Direction::Lowest,
                Split::Valid,
            ),
            Arc::clone(&progress),
        ))
        .early_stopping(MetricEarlyStoppingStrategy::new(
            &LossMetric::<B>::new(),
            Aggregate::Mean,
            Direction::Lowest,
            Split::Valid,
            StoppingCondition::NoImprovementSince {
                n_epochs: settings.early_stopping_patience,
            },
        ))
        .learning_strategy(LearningStrategy::SingleDevice(device.clone()))
        .num_epochs(settings.num_epochs)
        .summary()
        .build(model, AdamConfig::new().init(), settings.learning_rate);

    let model_trained = learner.fit(dataloader_train, dataloader_val);
    let progress = progress
        .lock()
        .map(|p| *p)
        .map_err(|_| anyhow::anyhow!("エポック進捗のロックが壊れています"))?;
    tracing::info!(
        epochs_run = progress.completed,
        best_epoch = ?progress.best,
        "学習が完了しました"
    );

    // 検証lossが最小だったエポックの重みに戻す
    let trained_model = match progress.best {
        Some(best) => {
            let path = checkpoint_dir.join(format!("model-{}", best));
            tracing::info!(epoch = best, path = %path.display(), "最良エポックの重みを復元します");
            model_trained
                .model
                .load_file(path, &BinFileRecorder::<FullPrecisionSettings>::new(), &device)
                .map_err(|e| anyhow::anyhow!("最良チェックポイントの読み込みエラー: {:?}", e))?
        }
        None => {
            tracing::warn!("チェックポイントが無いため最終エポックの重みを保存します");
            model_trained.model
        }
    };
    tracing::info!(params = trained_model.num_params(), "モデルパラメータ数");

    if let Some(path) = &request.export_backbone {
        trained_model.save_backbone(path)?;
        tracing::info!(path = %path.display(), "特徴抽出器を書き出しました");
    }

    let metadata = ModelMetadata::new(
        categories,
        image_size,
        request.model.hidden_units,
        model_config.base_channels,
        total_samples,
        progress.completed as u32,
        frozen_backbone,
    );
    let model_binary = trained_model.to_bytes()?;
    let saved = save_model_with_metadata(&request.output_model_path, &metadata, &model_binary)?;
    tracing::info!(
        path = %saved.display(),
        bytes = model_binary.len(),
        "モデルを保存しました"
    );

    Ok(saved)
}
