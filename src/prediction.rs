//! モデル出力（確率ベクトル）から予測結果を組み立てる

use serde::{Deserialize, Serialize};

use crate::error::{PawError, Result};
use crate::labels::Categories;

/// 上位候補の数
pub const TOP_K: usize = 3;

/// 犬種と信頼度（%）の組
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreedScore {
    pub breed: String,
    pub confidence: f64,
}

/// 1枚の画像に対する予測結果
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// argmax の犬種
    pub breed: String,
    /// 最大確率 x 100（小数第2位で丸め）
    pub confidence: f64,
    /// 確率の高い順に最大 TOP_K 件
    pub top: Vec<BreedScore>,
}

impl Prediction {
    /// 1行分の確率ベクトルから予測を作成
    ///
    /// 同率の場合はインデックスの小さいカテゴリを優先するため、
    /// `breed` は常に `top[0].breed` と一致します。
    pub fn from_probabilities(row: &[f32], categories: &Categories) -> Result<Self> {
        if row.len() != categories.len() {
            return Err(PawError::shape_mismatch(
                format!("{} class probabilities", categories.len()),
                format!("{}", row.len()),
            ));
        }
        if row.is_empty() {
            return Err(PawError::Model("empty probability vector".to_string()));
        }

        let ranked = rank_indices(row);
        let top = ranked
            .iter()
            .take(TOP_K)
            .map(|&idx| BreedScore {
                breed: category_name(categories, idx),
                confidence: to_percent(row[idx]),
            })
            .collect::<Vec<_>>();

        let best = ranked[0];
        Ok(Self {
            breed: category_name(categories, best),
            confidence: to_percent(row[best]),
            top,
        })
    }
}

/// 確率の降順にインデックスを並べる（同率はインデックス昇順）
fn rank_indices(row: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..row.len()).collect();
    indices.sort_by(|&a, &b| row[b].total_cmp(&row[a]).then(a.cmp(&b)));
    indices
}

// 長さ検証済みのため必ず存在する
fn category_name(categories: &Categories, idx: usize) -> String {
    categories.name(idx).unwrap_or_default().to_string()
}

/// 確率を % に変換し小数第2位で丸める
pub fn to_percent(probability: f32) -> f64 {
    round2(probability as f64 * 100.0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Categories {
        Categories::from_labels(&["akita", "beagle", "labrador_retriever", "pug"])
    }

    #[test]
    fn picks_argmax_and_sorted_top3() {
        let row = [0.05, 0.15, 0.7, 0.1];
        let p = Prediction::from_probabilities(&row, &categories()).unwrap();
        assert_eq!(p.breed, "labrador_retriever");
        assert!((p.confidence - 70.0).abs() < 1e-9);
        let names: Vec<_> = p.top.iter().map(|s| s.breed.as_str()).collect();
        assert_eq!(names, ["labrador_retriever", "beagle", "pug"]);
        assert_eq!(p.top[0].breed, p.breed);
    }

    #[test]
    fn confidences_are_rounded_percentages() {
        let row = [0.123456, 0.876544, 0.0, 0.0];
        let p = Prediction::from_probabilities(&row, &categories()).unwrap();
        assert_eq!(p.top[0].confidence, 87.65);
        assert_eq!(p.top[1].confidence, 12.35);
        for score in &p.top {
            assert!((0.0..=100.0).contains(&score.confidence));
        }
    }

    #[test]
    fn ties_prefer_lower_index() {
        let row = [0.25, 0.25, 0.25, 0.25];
        let p = Prediction::from_probabilities(&row, &categories()).unwrap();
        assert_eq!(p.breed, "akita");
        assert_eq!(p.top[0].breed, "akita");
        assert_eq!(p.top[2].breed, "labrador_retriever");
    }

    #[test]
    fn fewer_categories_than_top_k() {
        let cats = Categories::from_labels(&["akita", "pug"]);
        let p = Prediction::from_probabilities(&[0.4, 0.6], &cats).unwrap();
        assert_eq!(p.top.len(), 2);
        assert_eq!(p.breed, "pug");
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let err = Prediction::from_probabilities(&[1.0], &categories()).unwrap_err();
        assert!(matches!(err, PawError::ShapeMismatch { .. }));
    }
}
