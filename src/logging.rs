//! ログ出力の初期化

use anyhow::anyhow;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::model::config::LoggingSettings;

/// グローバルなサブスクライバーを登録する
///
/// `RUST_LOG` が設定されていればそちらを優先する。二重登録はエラー。
pub fn init(settings: &LoggingSettings) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if settings.json {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow!("ログの初期化に失敗しました: {}", e))?;
    } else {
        subscriber
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| anyhow!("ログの初期化に失敗しました: {}", e))?;
    }

    Ok(())
}
