//! 前処理済みデータセットから犬種分類モデルを学習する

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pawdentify_lib::dataset::LABELS_FILE;
use pawdentify_lib::logging;
use pawdentify_lib::ml::{train_on, TrainingRequest};
use pawdentify_lib::model::{log_metadata_info, load_metadata, AppConfig, DeviceType};

#[derive(Parser)]
#[command(name = "train")]
#[command(about = "Train the dog breed classifier")]
struct Args {
    /// 設定ファイル
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// prepare の出力ディレクトリ
    #[arg(long, default_value = "data/prepared")]
    data_dir: PathBuf,

    /// モデルバンドルの保存先（省略時は設定の成果物パス）
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 計算デバイス (cpu / wgpu)
    #[arg(long)]
    device: Option<DeviceType>,

    /// エポック数
    #[arg(long)]
    epochs: Option<usize>,

    /// 事前学習済み特徴抽出器の重み
    #[arg(long)]
    backbone: Option<PathBuf>,

    /// 学習後の特徴抽出器の書き出し先
    #[arg(long)]
    export_backbone: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, config_message) = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(device) = args.device {
        config.device_type = device;
    }
    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(backbone) = args.backbone {
        config.model.backbone_path = Some(backbone);
    }
    if let Some(output) = args.output {
        config.artifacts.model_path = output;
    }

    logging::init(&config.logging)?;
    tracing::info!("{}", config_message);

    let request = TrainingRequest {
        data_dir: args.data_dir.clone(),
        output_model_path: config.artifacts.model_path.clone(),
        export_backbone: args.export_backbone,
        model: config.model.clone(),
        training: config.training.clone(),
    };

    let saved = train_on(config.device_type, &request)?;

    // サーバーが突き合わせるラベルファイルを成果物ディレクトリへ
    let labels_src = args.data_dir.join(LABELS_FILE);
    let labels_dst = &config.artifacts.labels_path;
    if let Some(parent) = labels_dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(&labels_src, labels_dst).with_context(|| {
        format!(
            "ラベルファイルのコピーに失敗: {} -> {}",
            labels_src.display(),
            labels_dst.display()
        )
    })?;
    tracing::info!(path = %labels_dst.display(), "ラベルファイルを書き出しました");

    let metadata = load_metadata(&saved)?;
    log_metadata_info(&metadata);

    Ok(())
}
