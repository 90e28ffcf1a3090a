//! 犬種ラベルとカテゴリ順序
//!
//! 学習ラベル配列を重複排除・ソートしたものがカテゴリ順序になります。
//! モデル出力のインデックスはこの順序でのみ犬種名に変換できます。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{PawError, Result};

/// 順序付きカテゴリ一覧（インデックス -> 犬種名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Categories(Vec<String>);

impl Categories {
    /// 学習ラベル配列からカテゴリを導出（ソート済み・重複なし）
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        let unique: BTreeSet<&str> = labels.iter().map(|l| l.as_ref()).collect();
        Self(unique.into_iter().map(str::to_string).collect())
    }

    /// 保存済みの順序をそのまま使う
    pub fn from_ordered(names: Vec<String>) -> Result<Self> {
        let unique: BTreeSet<&String> = names.iter().collect();
        if unique.len() != names.len() {
            return Err(PawError::CategoryMismatch(
                "category list contains duplicates".to_string(),
            ));
        }
        Ok(Self(names))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// インデックスから犬種名を取得
    pub fn name(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// 犬種名からインデックスを取得
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }

    /// ラベル配列をカテゴリインデックスに変換
    pub fn encode<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels
            .iter()
            .map(|label| {
                self.index_of(label.as_ref()).ok_or_else(|| {
                    PawError::CategoryMismatch(format!("unknown label '{}'", label.as_ref()))
                })
            })
            .collect()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// 別のカテゴリ一覧と順序まで一致するか検証
    pub fn ensure_matches(&self, other: &Categories) -> Result<()> {
        if self == other {
            return Ok(());
        }
        let first_diff = self
            .0
            .iter()
            .zip(other.0.iter())
            .position(|(a, b)| a != b);
        let reason = match first_diff {
            Some(i) => format!(
                "index {} is '{}' in the model but '{}' in the labels file",
                i, self.0[i], other.0[i]
            ),
            None => format!(
                "model has {} categories, labels file yields {}",
                self.len(),
                other.len()
            ),
        };
        Err(PawError::CategoryMismatch(reason))
    }
}

/// ラベルファイル（JSON配列）を読み込む
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(PawError::missing("labels file", path));
    }
    let content = std::fs::read_to_string(path)?;
    let labels: Vec<String> = serde_json::from_str(&content)?;
    if labels.is_empty() {
        return Err(PawError::invalid(path, "labels file is empty"));
    }
    Ok(labels)
}

/// ラベルファイル（JSON配列）を書き込む
pub fn save_labels(path: &Path, labels: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string(labels)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_are_sorted_and_unique() {
        let labels = ["pug", "beagle", "pug", "akita", "beagle"];
        let categories = Categories::from_labels(&labels);
        assert_eq!(categories.as_slice(), &["akita", "beagle", "pug"]);
        assert_eq!(categories.index_of("pug"), Some(2));
        assert_eq!(categories.name(0), Some("akita"));
        assert_eq!(categories.name(3), None);
    }

    #[test]
    fn encode_maps_labels_to_indices() {
        let labels = vec!["pug".to_string(), "akita".to_string(), "pug".to_string()];
        let categories = Categories::from_labels(&labels);
        assert_eq!(categories.encode(&labels).unwrap(), vec![1, 0, 1]);
        assert!(categories.encode(&["corgi"]).is_err());
    }

    #[test]
    fn ensure_matches_reports_first_difference() {
        let a = Categories::from_ordered(vec!["akita".into(), "pug".into()]).unwrap();
        let b = Categories::from_ordered(vec!["pug".into(), "akita".into()]).unwrap();
        let err = a.ensure_matches(&b).unwrap_err();
        assert!(err.to_string().contains("index 0"));
        assert!(a.ensure_matches(&a.clone()).is_ok());
    }

    #[test]
    fn ordered_list_rejects_duplicates() {
        assert!(Categories::from_ordered(vec!["pug".into(), "pug".into()]).is_err());
    }

    #[test]
    fn labels_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let labels = vec!["pug".to_string(), "akita".to_string()];
        save_labels(&path, &labels).unwrap();
        assert_eq!(load_labels(&path).unwrap(), labels);
    }

    #[test]
    fn missing_labels_file_is_reported() {
        let err = load_labels(Path::new("/nonexistent/labels.json")).unwrap_err();
        assert!(matches!(err, PawError::MissingArtifact { .. }));
    }
}
