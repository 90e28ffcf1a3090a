use crate::error::Result;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// labels.csv の1行（画像ID と犬種）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelRow {
    pub id: String,
    pub breed: String,
}

pub fn load_csv(path: &Path) -> Result<Vec<LabelRow>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: LabelRow = result?;
        rows.push(row);
    }

    Ok(rows)
}

/// 犬種ごとの行数
pub fn breed_counts(rows: &[LabelRow]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(row.breed.as_str()).or_insert(0) += 1;
    }
    counts
}
