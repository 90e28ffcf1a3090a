//! アプリケーション設定管理モジュール
//!
//! 計算デバイス・成果物パス・学習パラメータなどをJSON形式で保存・読み込みします。

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::preprocess::DEFAULT_INPUT_SIZE;

/// 計算デバイスの種類
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// WGPU (GPU) バックエンド
    Wgpu,
    /// NdArray (CPU) バックエンド
    #[default]
    Cpu,
}

impl std::fmt::Display for DeviceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceType::Wgpu => write!(f, "WGPU (GPU)"),
            DeviceType::Cpu => write!(f, "CPU (NdArray)"),
        }
    }
}

impl std::str::FromStr for DeviceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(DeviceType::Cpu),
            "wgpu" | "gpu" => Ok(DeviceType::Wgpu),
            other => Err(format!("unknown device type: {}", other)),
        }
    }
}

/// HTTPサーバー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// アップロードの最大サイズ（バイト）
    pub body_limit_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 20 * 1024 * 1024,
        }
    }
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 起動時に読み込む成果物のパス
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactSettings {
    /// モデルバンドル (tar.gz)
    pub model_path: PathBuf,
    /// 学習ラベル配列 (JSON)
    pub labels_path: PathBuf,
    /// 犬種情報 (JSON)
    pub breed_info_path: PathBuf,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("artifacts/dog-breed-model.tar.gz"),
            labels_path: PathBuf::from("artifacts/labels.json"),
            breed_info_path: PathBuf::from("artifacts/breed_info.json"),
        }
    }
}

/// モデル設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// 入力画像サイズ（正方形）
    pub input_size: u32,
    /// 全結合層のユニット数
    pub hidden_units: usize,
    /// ドロップアウト率
    pub dropout: f64,
    /// 特徴抽出器の基本チャンネル数
    pub base_channels: usize,
    /// 事前学習済み特徴抽出器の重み（任意）
    pub backbone_path: Option<PathBuf>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            hidden_units: 256,
            dropout: 0.0,
            base_channels: 32,
            backbone_path: None,
        }
    }
}

/// トレーニング設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// エポック数
    pub num_epochs: usize,
    /// バッチサイズ
    pub batch_size: usize,
    /// ワーカー数
    pub num_workers: usize,
    /// 学習率
    pub learning_rate: f64,
    /// ランダムシード
    pub seed: u64,
    /// 検証データの割合
    pub validation_ratio: f32,
    /// 検証lossが改善しないまま許容するエポック数
    pub early_stopping_patience: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            num_epochs: 20,
            batch_size: 8,
            num_workers: 1,
            learning_rate: 1e-4,
            seed: 42,
            validation_ratio: 0.3,
            early_stopping_patience: 7,
        }
    }
}

/// ログ設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// RUST_LOG が無い場合のフィルタ
    pub level: String,
    /// JSON形式で出力する
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 計算デバイスの種類
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub artifacts: ArtifactSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub training: TrainingSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("config.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// 指定パス（省略時はデフォルトパス）から読み込む
    ///
    /// 省略時にデフォルトパスが無ければデフォルト設定を使う。明示したパスが無い場合と、
    /// 存在するファイルが読めない場合はエラー。
    /// ロガー初期化前に呼ばれるため、結果は `tracing` ではなく戻り値のメッセージで返す。
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<(Self, String)> {
        let explicit = path.is_some();
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if !path.exists() {
            if explicit {
                anyhow::bail!("設定ファイルが存在しません: {}", path.display());
            }
            return Ok((
                Self::default(),
                "設定ファイルが存在しません。デフォルト設定を使用します".to_string(),
            ));
        }

        let config = Self::load(&path)
            .with_context(|| format!("設定ファイルの読み込みに失敗しました: {}", path.display()))?;
        Ok((config, format!("設定ファイルを読み込みました: {}", path.display())))
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// 設定情報をログに出す
    pub fn log_summary(&self) {
        tracing::info!(
            device = %self.device_type,
            bind = %self.server.bind_addr(),
            model = %self.artifacts.model_path.display(),
            labels = %self.artifacts.labels_path.display(),
            breed_info = %self.artifacts.breed_info_path.display(),
            input_size = self.model.input_size,
            "アプリケーション設定"
        );
    }
}
