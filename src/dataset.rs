//! 前処理済みデータセットの作成と永続化
//!
//! ファイル構成:
//! - images.bin  - 8bit RGB 画像 (size x size x 3) を順に連結したもの
//! - labels.json - 各画像の犬種名（images.bin と同じ順）

use std::collections::BTreeMap;
use std::path::Path;

use crate::csv_loader::LabelRow;
use crate::error::{PawError, Result};
use crate::labels::{load_labels, save_labels};
use crate::preprocess::{resize_area, CHANNELS};

pub const IMAGES_FILE: &str = "images.bin";
pub const LABELS_FILE: &str = "labels.json";

/// 前処理済みデータセット
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    image_size: u32,
    pixels: Vec<u8>,
    labels: Vec<String>,
}

impl PreparedDataset {
    pub fn new(image_size: u32) -> Self {
        Self {
            image_size,
            pixels: Vec::new(),
            labels: Vec::new(),
        }
    }

    /// 1サンプルあたりのバイト数
    pub fn sample_len(&self) -> usize {
        Self::sample_len_for(self.image_size)
    }

    fn sample_len_for(image_size: u32) -> usize {
        image_size as usize * image_size as usize * CHANNELS
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// サンプルを追加（画素数は image_size に一致している必要がある）
    pub fn push(&mut self, pixels: &[u8], label: impl Into<String>) -> Result<()> {
        if pixels.len() != self.sample_len() {
            return Err(PawError::shape_mismatch(
                format!("{} bytes", self.sample_len()),
                format!("{} bytes", pixels.len()),
            ));
        }
        self.pixels.extend_from_slice(pixels);
        self.labels.push(label.into());
        Ok(())
    }

    /// index 番目の画素 (H, W, 3)
    pub fn pixels(&self, index: usize) -> Option<&[u8]> {
        let len = self.sample_len();
        self.pixels.get(index * len..(index + 1) * len)
    }

    /// 犬種ごとのサンプル数
    pub fn breed_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for label in &self.labels {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
        counts
    }

    /// ディレクトリに保存
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(IMAGES_FILE), &self.pixels)?;
        save_labels(&dir.join(LABELS_FILE), &self.labels)?;
        Ok(())
    }

    /// ディレクトリから読み込む（画像サイズはファイル長から求める）
    pub fn load(dir: &Path) -> Result<Self> {
        let images_path = dir.join(IMAGES_FILE);
        if !images_path.exists() {
            return Err(PawError::missing("prepared images", images_path));
        }
        let labels = load_labels(&dir.join(LABELS_FILE))?;
        let pixels = std::fs::read(&images_path)?;

        if pixels.len() % labels.len() != 0 {
            return Err(PawError::invalid(
                &images_path,
                format!("{} bytes cannot hold {} samples", pixels.len(), labels.len()),
            ));
        }
        let per_sample = pixels.len() / labels.len();
        let side = ((per_sample / CHANNELS) as f64).sqrt().round() as u32;
        if Self::sample_len_for(side) != per_sample {
            return Err(PawError::invalid(
                &images_path,
                format!("{} bytes per sample is not a square RGB image", per_sample),
            ));
        }

        Ok(Self {
            image_size: side,
            pixels,
            labels,
        })
    }
}

/// labels.csv の行と画像ディレクトリからデータセットを作成
///
/// 読み込めない画像は警告を出して読み飛ばします。
pub fn prepare_dataset(rows: &[LabelRow], image_dir: &Path, image_size: u32) -> Result<PreparedDataset> {
    let mut dataset = PreparedDataset::new(image_size);

    for (idx, row) in rows.iter().enumerate() {
        let img_path = image_dir.join(format!("{}.jpg", row.id));
        let img = match image::open(&img_path) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(path = %img_path.display(), error = %e, "画像の読み込みに失敗しました");
                continue;
            }
        };

        let resized = resize_area(&img.to_rgb8(), image_size, image_size);
        dataset.push(resized.as_raw(), row.breed.clone())?;

        if (idx + 1) % 500 == 0 {
            tracing::info!(processed = idx + 1, total = rows.len(), "前処理中");
        }
    }

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut dataset = PreparedDataset::new(4);
        dataset.push(&[10u8; 48], "pug").unwrap();
        dataset.push(&[20u8; 48], "akita").unwrap();
        dataset.save(dir.path()).unwrap();

        let loaded = PreparedDataset::load(dir.path()).unwrap();
        assert_eq!(loaded.image_size(), 4);
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.pixels(1).unwrap(), &[20u8; 48][..]);
        assert_eq!(loaded.labels(), &["pug", "akita"]);
        assert!(loaded.pixels(2).is_none());
    }

    #[test]
    fn push_rejects_wrong_size() {
        let mut dataset = PreparedDataset::new(4);
        assert!(dataset.push(&[0u8; 47], "pug").is_err());
    }

    #[test]
    fn prepare_skips_unreadable_images() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(40, 30, Rgb([200, 100, 50]))
            .save(dir.path().join("a1.jpg"))
            .unwrap();
        std::fs::write(dir.path().join("b2.jpg"), b"not a jpeg").unwrap();

        let rows = vec![
            LabelRow { id: "a1".into(), breed: "pug".into() },
            LabelRow { id: "b2".into(), breed: "akita".into() },
            LabelRow { id: "c3".into(), breed: "akita".into() },
        ];
        let dataset = prepare_dataset(&rows, dir.path(), 8).unwrap();
        assert_eq!(dataset.len(), 1);
        assert_eq!(dataset.labels(), &["pug"]);
        assert_eq!(dataset.pixels(0).unwrap().len(), 8 * 8 * 3);
        assert_eq!(dataset.breed_counts()["pug"], 1);
    }
}
