//! 犬種情報（性格・食事・健康管理）の読み込みと参照

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PawError, Result};

/// 情報が無い場合の既定値
pub const NOT_AVAILABLE: &str = "Not available";

/// JSONファイル上の1犬種分のレコード（各フィールドは省略可）
#[derive(Debug, Clone, Default, Deserialize)]
struct BreedInfoRecord {
    nature: Option<String>,
    diet: Option<String>,
    healthcare_tips: Option<String>,
}

/// レスポンスに載せる犬種情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreedInfo {
    pub nature: String,
    pub diet: String,
    pub healthcare_tips: String,
}

impl BreedInfo {
    /// すべて "Not available" の情報
    pub fn not_available() -> Self {
        Self {
            nature: NOT_AVAILABLE.to_string(),
            diet: NOT_AVAILABLE.to_string(),
            healthcare_tips: NOT_AVAILABLE.to_string(),
        }
    }
}

impl From<&BreedInfoRecord> for BreedInfo {
    fn from(record: &BreedInfoRecord) -> Self {
        let or_default = |field: &Option<String>| {
            field.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        Self {
            nature: or_default(&record.nature),
            diet: or_default(&record.diet),
            healthcare_tips: or_default(&record.healthcare_tips),
        }
    }
}

/// 犬種名 -> 犬種情報 の読み取り専用テーブル
#[derive(Debug, Clone, Default)]
pub struct BreedInfoStore {
    records: HashMap<String, BreedInfoRecord>,
}

impl BreedInfoStore {
    /// JSONファイルから読み込む
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PawError::missing("breed info", path));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let records: HashMap<String, BreedInfoRecord> = serde_json::from_str(json)?;
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, breed: &str) -> bool {
        self.records.contains_key(breed)
    }

    /// 犬種情報を取得（未登録の犬種・欠けたフィールドは "Not available"）
    pub fn lookup(&self, breed: &str) -> BreedInfo {
        match self.records.get(breed) {
            Some(record) => BreedInfo::from(record),
            None => {
                tracing::warn!(breed, "犬種情報が登録されていません");
                BreedInfo::not_available()
            }
        }
    }
}
