//! labels.csv と画像ディレクトリから学習用データセットを作成する

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pawdentify_lib::csv_loader::{breed_counts, load_csv};
use pawdentify_lib::dataset::prepare_dataset;
use pawdentify_lib::logging;
use pawdentify_lib::model::config::LoggingSettings;
use pawdentify_lib::preprocess::DEFAULT_INPUT_SIZE;

#[derive(Parser)]
#[command(name = "prepare")]
#[command(about = "Resize labelled dog images into a training dataset")]
struct Args {
    /// id,breed 形式のCSV
    #[arg(long, default_value = "data/labels.csv")]
    labels_csv: PathBuf,

    /// <id>.jpg が置かれたディレクトリ
    #[arg(long, default_value = "data/train")]
    images_dir: PathBuf,

    /// 出力ディレクトリ
    #[arg(short, long, default_value = "data/prepared")]
    output: PathBuf,

    /// リサイズ後の一辺
    #[arg(long, default_value_t = DEFAULT_INPUT_SIZE)]
    size: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&LoggingSettings::default())?;

    let rows = load_csv(&args.labels_csv)
        .with_context(|| format!("CSVの読み込みに失敗: {}", args.labels_csv.display()))?;
    tracing::info!(rows = rows.len(), breeds = breed_counts(&rows).len(), "CSVを読み込みました");

    let dataset = prepare_dataset(&rows, &args.images_dir, args.size)?;
    if dataset.is_empty() {
        anyhow::bail!("読み込めた画像がありません: {}", args.images_dir.display());
    }

    for (breed, count) in dataset.breed_counts() {
        tracing::info!(breed, count, "犬種別サンプル数");
    }
    tracing::info!(
        samples = dataset.len(),
        skipped = rows.len() - dataset.len(),
        size = args.size,
        "前処理が完了しました"
    );

    dataset.save(&args.output)?;
    tracing::info!(path = %args.output.display(), "データセットを保存しました");

    Ok(())
}
