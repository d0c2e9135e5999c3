//! Model blob downloader: HTTP GET with retry/backoff, `.tmp` sidecar
//! streaming, SHA-256 verification, atomic rename (spec.md §6).
//!
//! Grounded on the teacher's `ureq` usage (the teacher's own HTTP calls in
//! its web-fetch tooling use blocking `ureq::get(...).call()`); the
//! retry/backoff loop and `.tmp`-then-rename protocol have no teacher
//! analog and are hand-rolled from spec.md's description. `sha2` is a new
//! dependency relative to the teacher (which only carries `sha1`, for its
//! WebSocket handshake) — justified in DESIGN.md as the same RustCrypto
//! family already represented in the dependency tree.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::error::{DownloadError, RuntimeError};
use crate::types::CancelToken;

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Monotonically increasing download progress, reported after each chunk.
/// `bytes_downloaded` only ever grows within one attempt; a retried attempt
/// starts its own fresh count since the `.tmp` sidecar is recreated at the
/// start of each attempt.
#[derive(Debug, Clone, Copy)]
pub struct DownloadProgress {
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub bytes_per_second: f64,
    pub eta_seconds: Option<f64>,
}

/// Downloads `url` to `destination`, verifying against `expected_sha256` if
/// given. Streams into a `.tmp` sidecar alongside `destination` and renames
/// atomically on success, so a reader never observes a partial file at the
/// final path. Retries transient HTTP/network failures with exponential
/// backoff, up to `MAX_ATTEMPTS`. If `cancel` is cancelled, the in-progress
/// `.tmp` sidecar is removed and the call returns a `Cancelled` error.
pub fn download_with_retry(
    url: &str,
    destination: &Path,
    expected_sha256: Option<&str>,
    cancel: &CancelToken,
    mut on_progress: impl FnMut(DownloadProgress),
) -> Result<(), RuntimeError> {
    let mut last_error = None;
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=MAX_ATTEMPTS {
        match try_download_once(url, destination, expected_sha256, cancel, &mut on_progress) {
            Ok(()) => return Ok(()),
            Err(RuntimeError::Download(DownloadError::Cancelled)) => {
                return Err(DownloadError::Cancelled.into());
            }
            Err(err) if is_retryable(&err) && attempt < MAX_ATTEMPTS => {
                log::warn!("download attempt {attempt} of {MAX_ATTEMPTS} failed: {err}; retrying in {backoff:?}");
                std::thread::sleep(backoff);
                backoff *= 2;
                last_error = Some(err);
            }
            Err(err) => {
                return Err(DownloadError::NetworkRetriesExhausted {
                    attempts: attempt,
                    message: err.to_string(),
                }
                .into());
            }
        }
    }
    Err(DownloadError::NetworkRetriesExhausted {
        attempts: MAX_ATTEMPTS,
        message: last_error.map(|e| e.to_string()).unwrap_or_default(),
    }
    .into())
}

fn is_retryable(err: &RuntimeError) -> bool {
    matches!(err, RuntimeError::Download(DownloadError::Http(status)) if *status >= 500)
        || matches!(err, RuntimeError::Download(DownloadError::NetworkRetriesExhausted { .. }))
}

fn try_download_once(
    url: &str,
    destination: &Path,
    expected_sha256: Option<&str>,
    cancel: &CancelToken,
    on_progress: &mut impl FnMut(DownloadProgress),
) -> Result<(), RuntimeError> {
    let response = ureq::get(url)
        .call()
        .map_err(|err| map_ureq_error(&err))?;

    let total_bytes = response
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok());

    let tmp_path = sidecar_path(destination);
    let mut tmp_file = std::fs::File::create(&tmp_path)
        .map_err(|_| RuntimeError::Download(DownloadError::Http(0)))?;

    let mut hasher = Sha256::new();
    let mut reader = response.into_reader();
    let mut buffer = [0u8; 64 * 1024];
    let mut bytes_downloaded = 0u64;
    let started_at = Instant::now();

    loop {
        if cancel.is_cancelled() {
            drop(tmp_file);
            let _ = std::fs::remove_file(&tmp_path);
            return Err(DownloadError::Cancelled.into());
        }
        let read = reader.read(&mut buffer).map_err(|_| RuntimeError::Download(DownloadError::Http(0)))?;
        if read == 0 {
            break;
        }
        tmp_file
            .write_all(&buffer[..read])
            .map_err(|_| RuntimeError::Download(DownloadError::Http(0)))?;
        hasher.update(&buffer[..read]);
        bytes_downloaded += read as u64;

        let elapsed = started_at.elapsed().as_secs_f64();
        let bytes_per_second = if elapsed > 0.0 { bytes_downloaded as f64 / elapsed } else { 0.0 };
        let eta_seconds = match (total_bytes, bytes_per_second) {
            (Some(total), bps) if bps > 0.0 && total > bytes_downloaded => {
                Some((total - bytes_downloaded) as f64 / bps)
            }
            _ => None,
        };
        on_progress(DownloadProgress { bytes_downloaded, total_bytes, bytes_per_second, eta_seconds });
    }
    tmp_file.flush().ok();
    drop(tmp_file);

    if cancel.is_cancelled() {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(DownloadError::Cancelled.into());
    }

    if let Some(expected) = expected_sha256 {
        let actual = hex_digest(hasher.finalize().as_slice());
        if !actual.eq_ignore_ascii_case(expected) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(DownloadError::VerifyFailed.into());
        }
    }

    std::fs::rename(&tmp_path, destination).map_err(|_| RuntimeError::Download(DownloadError::Http(0)))?;
    Ok(())
}

fn sidecar_path(destination: &Path) -> PathBuf {
    let mut tmp = destination.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn map_ureq_error(err: &ureq::Error) -> RuntimeError {
    match err {
        ureq::Error::Status(code, _) => DownloadError::Http(*code).into(),
        ureq::Error::Transport(_) => DownloadError::NetworkRetriesExhausted {
            attempts: 1,
            message: err.to_string(),
        }
        .into(),
    }
}
