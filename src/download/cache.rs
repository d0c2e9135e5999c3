//! On-disk model cache: blob + sidecar metadata layout, checksum-based
//! cache-hit detection (spec.md §6).
//!
//! Grounded on `ModelMetadataFile` (`crate::types::model`), which already
//! defines the sidecar's JSON shape; this module is the read/write/hash-check
//! layer around that type, paired with `downloader::download_with_retry`.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{ModelLoadError, RuntimeError};
use crate::types::{ModelDescriptor, ModelMetadataFile};

/// Where a model's blob and metadata sidecar live under a cache root.
pub struct CacheEntry {
    pub blob_path: PathBuf,
    pub metadata_path: PathBuf,
}

pub fn entry_for(cache_dir: &Path, descriptor: &ModelDescriptor) -> CacheEntry {
    CacheEntry {
        blob_path: cache_dir.join(format!("{}.{}", descriptor.id, descriptor.file_extension())),
        metadata_path: cache_dir.join(format!("{}_metadata.json", descriptor.id)),
    }
}

/// True when both the blob and its metadata sidecar exist and the blob's
/// SHA-256 matches the descriptor's expected checksum (or the descriptor
/// declares none, in which case presence alone is treated as a hit).
pub fn is_cached(cache_dir: &Path, descriptor: &ModelDescriptor) -> bool {
    let entry = entry_for(cache_dir, descriptor);
    if !entry.blob_path.is_file() || !entry.metadata_path.is_file() {
        return false;
    }
    match &descriptor.sha256 {
        Some(expected) => sha256_of_file(&entry.blob_path).map(|actual| actual.eq_ignore_ascii_case(expected)).unwrap_or(false),
        None => true,
    }
}

/// Verifies a freshly downloaded blob against the descriptor's checksum and
/// writes the metadata sidecar on success.
pub fn finalize_download(cache_dir: &Path, descriptor: &ModelDescriptor, downloaded_at: &str) -> Result<(), RuntimeError> {
    let entry = entry_for(cache_dir, descriptor);
    if let Some(expected) = &descriptor.sha256 {
        let actual = sha256_of_file(&entry.blob_path)
            .map_err(|_| ModelLoadError::CorruptFile(entry.blob_path.display().to_string()))?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ModelLoadError::ChecksumMismatch {
                path: entry.blob_path.display().to_string(),
                expected: expected.clone(),
                actual,
            }
            .into());
        }
    }
    let file = ModelMetadataFile {
        model: descriptor.clone(),
        downloaded_at: downloaded_at.to_string(),
    };
    let json = serde_json::to_string_pretty(&file).map_err(|_| ModelLoadError::CorruptFile(entry.metadata_path.display().to_string()))?;
    fs::write(&entry.metadata_path, json).map_err(|_| ModelLoadError::CorruptFile(entry.metadata_path.display().to_string()))?;
    Ok(())
}

pub fn load_metadata(cache_dir: &Path, model_id: &str) -> Result<ModelMetadataFile, RuntimeError> {
    let path = cache_dir.join(format!("{model_id}_metadata.json"));
    let json = fs::read_to_string(&path).map_err(|_| ModelLoadError::MissingFile(path.display().to_string()))?;
    serde_json::from_str(&json).map_err(|_| ModelLoadError::CorruptFile(path.display().to_string()).into())
}

fn sha256_of_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capability, ModelFamily, ModelFormat, Quantization};

    fn descriptor(sha256: Option<&str>) -> ModelDescriptor {
        ModelDescriptor {
            id: "tinyllama-1b".into(),
            display_name: "TinyLlama 1.1B".into(),
            family: ModelFamily::TinyLlama,
            size_bytes: 4,
            format: ModelFormat::Gguf,
            quantization: Quantization::Q4KM,
            params_billions: 1.1,
            sha256: sha256.map(String::from),
            download_url: None,
            max_context_length: 2048,
            capabilities: vec![Capability::Chat],
            companion_id: None,
        }
    }

    fn temp_dir() -> PathBuf {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("edge_veda_cache_test_{}_{n}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_blob_is_not_cached() {
        let dir = temp_dir();
        assert!(!is_cached(&dir, &descriptor(None)));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn finalize_then_is_cached_round_trips_without_checksum() {
        let dir = temp_dir();
        let descriptor = descriptor(None);
        let entry = entry_for(&dir, &descriptor);
        fs::write(&entry.blob_path, b"fake").unwrap();
        finalize_download(&dir, &descriptor, "2026-01-01T00:00:00Z").unwrap();
        assert!(is_cached(&dir, &descriptor));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn finalize_rejects_checksum_mismatch() {
        let dir = temp_dir();
        let descriptor = descriptor(Some("0000000000000000000000000000000000000000000000000000000000000000"));
        let entry = entry_for(&dir, &descriptor);
        fs::write(&entry.blob_path, b"fake").unwrap();
        let result = finalize_download(&dir, &descriptor, "2026-01-01T00:00:00Z");
        assert!(matches!(result, Err(RuntimeError::ModelLoad(ModelLoadError::ChecksumMismatch { .. }))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_metadata_reports_missing_file() {
        let dir = temp_dir();
        let result = load_metadata(&dir, "nonexistent");
        assert!(matches!(result, Err(RuntimeError::ModelLoad(ModelLoadError::MissingFile(_)))));
        fs::remove_dir_all(&dir).ok();
    }
}
