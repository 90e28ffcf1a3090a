//! APIエラーとHTTPレスポンスへの変換

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// リクエスト単位のエラー（どちらも再試行しない）
#[derive(Debug, Error)]
pub enum ApiError {
    /// 画像が無い・空・デコード不能
    #[error("{0}")]
    BadRequest(String),

    /// アップロードが上限サイズを超えた
    #[error("{0}")]
    PayloadTooLarge(String),

    /// 前処理・推論・後処理の失敗
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn empty_file() -> Self {
        Self::BadRequest("Empty file".to_string())
    }

    pub fn undecodable() -> Self {
        Self::BadRequest("Could not decode image".to_string())
    }

    pub fn too_large() -> Self {
        Self::PayloadTooLarge("File too large".to_string())
    }

    /// マルチパートの読み取りエラー（サイズ超過は 413、それ以外は 400）
    pub fn multipart(err: MultipartError, context: &str) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::too_large()
        } else {
            Self::BadRequest(format!("{}: {}", context, err.body_text()))
        }
    }

    pub fn prediction_failed(cause: impl std::fmt::Display) -> Self {
        Self::Internal(format!("Prediction failed: {}", cause))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            ApiError::BadRequest(detail) | ApiError::PayloadTooLarge(detail) => {
                tracing::info!(%detail, "不正なリクエスト")
            }
            ApiError::Internal(detail) => tracing::error!(%detail, "推論に失敗しました"),
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::empty_file().status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::undecodable().status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::too_large().status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            ApiError::prediction_failed("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn prediction_failed_carries_cause() {
        let err = ApiError::prediction_failed("shape mismatch");
        assert_eq!(err.to_string(), "Prediction failed: shape mismatch");
    }
}
