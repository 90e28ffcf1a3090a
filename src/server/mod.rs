//! 推論APIサーバー

pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use handlers::{run_prediction, PredictResponse};
pub use state::{AppState, SharedState};

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::model::config::ServerSettings;

/// ルーターを構築
///
/// CORS はすべてのオリジン・メソッド・ヘッダーを許可します。
pub fn router(state: SharedState, body_limit: usize) -> Router {
    Router::new()
        .route("/predict/", post(handlers::predict))
        .route("/predict", post(handlers::predict))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Ctrl+C を受けるまでサーバーを実行
pub async fn serve(settings: &ServerSettings, state: AppState) -> anyhow::Result<()> {
    let app = router(Arc::new(state), settings.body_limit_bytes);

    let addr = settings.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "推論サーバーを起動しました");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("推論サーバーを停止しました");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルハンドラの登録に失敗しました");
        return;
    }
    tracing::info!("Ctrl+C を受信しました");
}
