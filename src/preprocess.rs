//! 画像の前処理
//!
//! 任意サイズの画像を学習時の解像度へ面積平均で縮小し、[0, 1] に正規化して
//! バッチ次元を付与します。レイアウトは (N, H, W, 3) の RGB です。

use image::{DynamicImage, ImageEncoder, RgbImage};

use crate::error::{PawError, Result};

/// 学習・推論の既定入力サイズ（正方形）
pub const DEFAULT_INPUT_SIZE: u32 = 160;

/// チャンネル数（RGB）
pub const CHANNELS: usize = 3;

/// 正規化済み画像バッチ (N, H, W, 3)
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBatch {
    data: Vec<f32>,
    batch_size: usize,
    height: usize,
    width: usize,
}

impl ImageBatch {
    /// 平坦化済みデータからバッチを作成
    pub fn new(data: Vec<f32>, batch_size: usize, height: usize, width: usize) -> Result<Self> {
        let expected = batch_size * height * width * CHANNELS;
        if data.len() != expected {
            return Err(PawError::shape_mismatch(
                format!("{} values for [{}, {}, {}, 3]", expected, batch_size, height, width),
                format!("{} values", data.len()),
            ));
        }
        Ok(Self {
            data,
            batch_size,
            height,
            width,
        })
    }

    /// 1枚のRGB画像をリサイズせずにバッチ化
    pub fn from_rgb(image: &RgbImage) -> Self {
        Self {
            data: normalize_pixels(image.as_raw()),
            batch_size: 1,
            height: image.height() as usize,
            width: image.width() as usize,
        }
    }

    /// [N, H, W, C]
    pub fn dims(&self) -> [usize; 4] {
        [self.batch_size, self.height, self.width, CHANNELS]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}

/// 0-255 の画素値を [0, 1] に線形変換
pub fn normalize_pixels(pixels: &[u8]) -> Vec<f32> {
    pixels.iter().map(|&p| p as f32 / 255.0).collect()
}

/// 画像をモデル入力に変換（リサイズ + 正規化 + バッチ次元）
pub fn prepare_image(image: &DynamicImage, size: u32) -> ImageBatch {
    let rgb = image.to_rgb8();
    let resized = resize_area(&rgb, size, size);
    ImageBatch::from_rgb(&resized)
}

/// バイト列をカラー画像としてデコード
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// 面積平均によるリサイズ
///
/// 縮小時は出力画素が覆う入力画素を重なり面積で加重平均します。
/// どちらかの軸が拡大になる場合は双線形補間を使います。
pub fn resize_area(image: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (src_w, src_h) = image.dimensions();
    if (src_w, src_h) == (width, height) {
        return image.clone();
    }
    if width > src_w || height > src_h || width == 0 || height == 0 {
        return image::imageops::resize(image, width, height, image::imageops::FilterType::Triangle);
    }

    let x_weights = area_weights(src_w as usize, width as usize);
    let y_weights = area_weights(src_h as usize, height as usize);
    let norm = (src_w as f64 / width as f64) * (src_h as f64 / height as f64);

    let mut out = RgbImage::new(width, height);
    for (dy, ys) in y_weights.iter().enumerate() {
        for (dx, xs) in x_weights.iter().enumerate() {
            let mut acc = [0.0f64; CHANNELS];
            for &(sy, wy) in ys {
                for &(sx, wx) in xs {
                    let pixel = image.get_pixel(sx as u32, sy as u32);
                    let w = wy * wx;
                    for c in 0..CHANNELS {
                        acc[c] += pixel[c] as f64 * w;
                    }
                }
            }
            let px = out.get_pixel_mut(dx as u32, dy as u32);
            for c in 0..CHANNELS {
                px[c] = (acc[c] / norm).round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// 1軸ぶんの (入力インデックス, 重なり長) の一覧を出力画素ごとに計算
fn area_weights(src_len: usize, dst_len: usize) -> Vec<Vec<(usize, f64)>> {
    let scale = src_len as f64 / dst_len as f64;
    (0..dst_len)
        .map(|d| {
            let start = d as f64 * scale;
            let end = ((d + 1) as f64 * scale).min(src_len as f64);
            let first = start.floor() as usize;
            let last = (end.ceil() as usize).min(src_len);
            (first..last)
                .filter_map(|s| {
                    let overlap = end.min((s + 1) as f64) - start.max(s as f64);
                    (overlap > 1e-9).then_some((s, overlap))
                })
                .collect()
        })
        .collect()
}

/// 画像をJPEGのdata URLに変換（失敗時は None）
pub fn to_data_url(image: &DynamicImage) -> Option<String> {
    let rgb = image.to_rgb8();
    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, 95);
    if let Err(e) = encoder.write_image(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        image::ExtendedColorType::Rgb8,
    ) {
        tracing::warn!(error = %e, "JPEGエンコードに失敗しました");
        return None;
    }

    let base64_data = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, &jpeg);
    Some(format!("data:image/jpeg;base64,{}", base64_data))
}
