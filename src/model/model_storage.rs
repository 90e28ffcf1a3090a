//! モデルとメタデータの永続化
//!
//! Tar.gz形式でモデルとメタデータを1ファイルに統合して保存・読み込みします。
//!
//! ファイル構成（tar.gz内部）:
//! - metadata.json   - メタデータ（カテゴリ順序、入力サイズなど）
//! - model.bin       - モデルの重み（バイナリ）

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

use crate::error::{PawError, Result};
use crate::labels::Categories;
use crate::model::model_metadata::ModelMetadata;

const METADATA_ENTRY: &str = "metadata.json";
const MODEL_ENTRY: &str = "model.bin";

/// 保存先パスを .tar.gz に正規化
pub fn bundle_path(output_path: &Path) -> PathBuf {
    if output_path.extension().and_then(|s| s.to_str()) == Some("gz") {
        output_path.to_path_buf()
    } else {
        output_path.with_extension("tar.gz")
    }
}

/// メタデータと共にモデルをTar.gz形式で保存
///
/// 保存先の実パスを返します。
pub fn save_model_with_metadata(
    output_path: &Path,
    metadata: &ModelMetadata,
    model_binary: &[u8],
) -> Result<PathBuf> {
    let tar_gz_path = bundle_path(output_path);

    if let Some(parent) = tar_gz_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tar_gz_file = File::create(&tar_gz_path)?;
    let encoder = GzEncoder::new(tar_gz_file, Compression::default());
    let mut tar_builder = Builder::new(encoder);

    let json_str = metadata.to_json_string()?;
    append_entry(&mut tar_builder, METADATA_ENTRY, json_str.as_bytes())?;
    append_entry(&mut tar_builder, MODEL_ENTRY, model_binary)?;

    tar_builder.into_inner()?.finish()?;

    Ok(tar_gz_path)
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, data: &[u8]) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_path(name)?;
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, data)?;
    Ok(())
}

fn open_archive(tar_gz_path: &Path) -> Result<Archive<GzDecoder<File>>> {
    if !tar_gz_path.exists() {
        return Err(PawError::missing("model bundle", tar_gz_path));
    }
    let tar_gz_file = File::open(tar_gz_path)?;
    Ok(Archive::new(GzDecoder::new(tar_gz_file)))
}

fn parse_metadata(tar_gz_path: &Path, json_str: &str) -> Result<ModelMetadata> {
    let metadata = ModelMetadata::from_json_string(json_str)?;
    if metadata.categories.is_empty() {
        return Err(PawError::invalid(tar_gz_path, "bundle has no categories"));
    }
    Categories::from_ordered(metadata.categories.as_slice().to_vec())?;
    Ok(metadata)
}

/// Tar.gzからモデルメタデータを読み込む
pub fn load_metadata(tar_gz_path: &Path) -> Result<ModelMetadata> {
    let mut archive = open_archive(tar_gz_path)?;

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.to_str() == Some(METADATA_ENTRY) {
            let mut json_str = String::new();
            entry.read_to_string(&mut json_str)?;
            return parse_metadata(tar_gz_path, &json_str);
        }
    }

    Err(PawError::invalid(tar_gz_path, "metadata.json not found in tar.gz archive"))
}

/// メタデータとモデルバイナリを共に読み込む
pub fn load_model_with_metadata(tar_gz_path: &Path) -> Result<(ModelMetadata, Vec<u8>)> {
    let mut archive = open_archive(tar_gz_path)?;

    let mut metadata_opt: Option<ModelMetadata> = None;
    let mut model_binary_opt: Option<Vec<u8>> = None;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?.to_path_buf();

        match path.to_str() {
            Some(METADATA_ENTRY) => {
                let mut json_str = String::new();
                entry.read_to_string(&mut json_str)?;
                metadata_opt = Some(parse_metadata(tar_gz_path, &json_str)?);
            }
            Some(MODEL_ENTRY) => {
                let mut buffer = Vec::new();
                entry.read_to_end(&mut buffer)?;
                model_binary_opt = Some(buffer);
            }
            _ => {}
        }
    }

    match (metadata_opt, model_binary_opt) {
        (Some(metadata), Some(binary)) => Ok((metadata, binary)),
        (None, _) => Err(PawError::invalid(tar_gz_path, "metadata.json not found in tar.gz archive")),
        (_, None) => Err(PawError::invalid(tar_gz_path, "model.bin not found in tar.gz archive")),
    }
}

/// メタデータをログに出す
pub fn log_metadata_info(metadata: &ModelMetadata) {
    tracing::info!(
        classes = metadata.num_classes(),
        input_size = metadata.model_input_size,
        hidden_units = metadata.hidden_units,
        base_channels = metadata.base_channels,
        samples = metadata.num_samples,
        epochs = metadata.num_epochs,
        frozen_backbone = metadata.frozen_backbone,
        trained_at = %metadata.trained_at,
        "モデルメタデータ"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> ModelMetadata {
        ModelMetadata::new(
            Categories::from_labels(&["beagle", "akita", "pug"]),
            64,
            32,
            4,
            12,
            3,
            false,
        )
    }

    #[test]
    fn bundle_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let saved = save_model_with_metadata(&dir.path().join("model"), &sample_metadata(), &[1, 2, 3, 4]).unwrap();
        assert!(saved.to_string_lossy().ends_with("model.tar.gz"));

        let (metadata, binary) = load_model_with_metadata(&saved).unwrap();
        assert_eq!(metadata.categories.as_slice(), &["akita", "beagle", "pug"]);
        assert_eq!(metadata.model_input_size, 64);
        assert_eq!(binary, vec![1, 2, 3, 4]);

        let only_metadata = load_metadata(&saved).unwrap();
        assert_eq!(only_metadata.hidden_units, 32);
    }

    #[test]
    fn keeps_existing_gz_extension() {
        assert_eq!(bundle_path(Path::new("out/m.tar.gz")), PathBuf::from("out/m.tar.gz"));
        assert_eq!(bundle_path(Path::new("out/m")), PathBuf::from("out/m.tar.gz"));
    }

    #[test]
    fn missing_bundle_is_reported() {
        let err = load_model_with_metadata(Path::new("/nonexistent/model.tar.gz")).unwrap_err();
        assert!(matches!(err, PawError::MissingArtifact { .. }));
    }
}
