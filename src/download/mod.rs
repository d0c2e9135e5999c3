//! Model acquisition: retried HTTP download, checksum verification, and a
//! checksum-aware on-disk cache (spec.md §6).

pub mod cache;
pub mod downloader;

pub use cache::{entry_for, finalize_download, is_cached, load_metadata, CacheEntry};
pub use downloader::{download_with_retry, DownloadProgress};
