//! ライブラリ共通のエラー型

use std::path::PathBuf;
use thiserror::Error;

/// 成果物の読み書き・推論で発生するエラー
#[derive(Debug, Error)]
pub enum PawError {
    /// 起動時に必要な成果物ファイルが存在しない
    #[error("{kind} not found at {}", path.display())]
    MissingArtifact {
        /// 成果物の種類（"model bundle" など）
        kind: &'static str,
        /// 探索したパス
        path: PathBuf,
    },

    /// 成果物の内容が不正
    #[error("invalid artifact {}: {reason}", path.display())]
    InvalidArtifact { path: PathBuf, reason: String },

    /// 学習時と推論時のカテゴリ順序が一致しない
    #[error("category mismatch: {0}")]
    CategoryMismatch(String),

    /// 入力テンソルの形状が不正
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    /// モデル重みの復元・推論エラー
    #[error("model error: {0}")]
    Model(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PawError {
    /// 成果物欠落エラーを作成
    #[must_use]
    pub fn missing(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::MissingArtifact {
            kind,
            path: path.into(),
        }
    }

    /// 成果物不正エラーを作成
    #[must_use]
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidArtifact {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 形状不一致エラーを作成
    #[must_use]
    pub fn shape_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// ライブラリ操作の結果型
pub type Result<T> = std::result::Result<T, PawError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_names_kind_and_path() {
        let err = PawError::missing("breed info", "/srv/breed_info.json");
        let msg = err.to_string();
        assert!(msg.contains("breed info"));
        assert!(msg.contains("/srv/breed_info.json"));
    }

    #[test]
    fn shape_mismatch_message() {
        let err = PawError::shape_mismatch("[1, 160, 160, 3]", "[1, 32, 32, 3]");
        assert!(err.to_string().contains("[1, 160, 160, 3]"));
        assert!(err.to_string().contains("[1, 32, 32, 3]"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PawError = io_err.into();
        assert!(matches!(err, PawError::Io(_)));
    }
}
