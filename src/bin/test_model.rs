//! 学習済みモデルで画像1枚を判定する手動テスト用バイナリ

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use pawdentify_lib::breed_info::BreedInfoStore;
use pawdentify_lib::ml::load_engine;
use pawdentify_lib::model::{AppConfig, DeviceType};
use pawdentify_lib::prediction::Prediction;
use pawdentify_lib::preprocess::prepare_image;

#[derive(Parser)]
#[command(name = "test_model")]
#[command(about = "Classify a single image with the trained model")]
struct Args {
    /// 判定する画像
    image: PathBuf,

    /// 設定ファイル
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 計算デバイス (cpu / wgpu)
    #[arg(long)]
    device: Option<DeviceType>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    println!("=== Dog Breed Model Test ===\n");

    let (mut config, config_message) = AppConfig::load_or_default(args.config.as_deref())?;
    if let Some(device) = args.device {
        config.device_type = device;
    }
    println!("{}", config_message);

    let artifacts = &config.artifacts;
    let model = load_engine(config.device_type, &artifacts.model_path)?;
    let breed_info = BreedInfoStore::load(&artifacts.breed_info_path)?;
    println!("✓ モデル読み込み成功: {} 犬種", model.categories().len());

    let img = image::open(&args.image)
        .with_context(|| format!("画像を開けません: {}", args.image.display()))?;
    let batch = prepare_image(&img, model.input_size());
    let rows = model.predict(&batch)?;
    let row = rows.first().context("モデルの出力が空です")?;
    let prediction = Prediction::from_probabilities(row, model.categories())?;

    println!("\n予測犬種: {} ({:.2}%)", prediction.breed, prediction.confidence);
    println!("\n上位{}件:", prediction.top.len());
    for (rank, score) in prediction.top.iter().enumerate() {
        println!("  {}. {} ({:.2}%)", rank + 1, score.breed, score.confidence);
    }

    println!("\n{}\n", "=".repeat(50));
    if breed_info.contains(&prediction.breed) {
        let info = breed_info.lookup(&prediction.breed);
        println!("性格: {}", info.nature);
        println!("食事: {}", info.diet);
        println!("健康管理: {}", info.healthcare_tips);
    } else {
        println!("{} の犬種情報はありません", prediction.breed);
    }

    Ok(())
}
