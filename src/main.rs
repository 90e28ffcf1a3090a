//! 推論APIサーバー

use std::path::PathBuf;

use clap::Parser;
use pawdentify_lib::model::{AppConfig, DeviceType};
use pawdentify_lib::server::{self, AppState};

#[derive(Parser)]
#[command(name = "pawdentify")]
#[command(about = "Dog breed classification API server")]
struct Args {
    /// 設定ファイル（省略時は config.json、無ければデフォルト）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 待ち受けアドレス
    #[arg(long, env = "PAWDENTIFY_HOST")]
    host: Option<String>,

    /// 待ち受けポート
    #[arg(short, long, env = "PAWDENTIFY_PORT")]
    port: Option<u16>,

    /// 計算デバイス (cpu / wgpu)
    #[arg(long)]
    device: Option<DeviceType>,

    /// モデルバンドル
    #[arg(long)]
    model: Option<PathBuf>,

    /// ラベルファイル
    #[arg(long)]
    labels: Option<PathBuf>,

    /// 犬種情報ファイル
    #[arg(long)]
    breed_info: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let (mut config, config_message) = AppConfig::load_or_default(args.config.as_deref())?;

    // コマンドライン引数で上書き
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(device) = args.device {
        config.device_type = device;
    }
    if let Some(model) = args.model {
        config.artifacts.model_path = model;
    }
    if let Some(labels) = args.labels {
        config.artifacts.labels_path = labels;
    }
    if let Some(breed_info) = args.breed_info {
        config.artifacts.breed_info_path = breed_info;
    }

    pawdentify_lib::logging::init(&config.logging)?;
    tracing::info!("{}", config_message);
    config.log_summary();

    // 成果物が揃わなければリクエストを受け付けない
    let state = AppState::load(&config).map_err(|e| {
        tracing::error!(error = %e, "成果物の読み込みに失敗しました");
        e
    })?;

    server::serve(&config.server, state).await
}
