//! Typed error taxonomy (spec.md §7).
//!
//! Every fallible operation in this crate returns `Result<T, RuntimeError>`.
//! FFI integer error codes are mapped exhaustively into this taxonomy by
//! `crate::ffi::error_map`; the session layer never re-interprets a kind, it
//! only forwards it to the caller.

use thiserror::Error;

/// The unified error taxonomy for the runtime core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("initialization error: {0}")]
    Initialization(#[from] InitError),

    #[error("model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),

    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    #[error("vision error: {0}")]
    Vision(#[from] VisionError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// An FFI integer error code this crate does not recognize.
    #[error("unknown backend error code {0}")]
    UnknownBackendCode(i32),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InitError {
    #[error("SDK not initialized")]
    NotInitialized,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("backend initialization failed")]
    BackendInitFailed,
    #[error("native context is invalid")]
    ContextInvalid,
    #[error("unsupported backend")]
    UnsupportedBackend,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    MissingFile(String),
    #[error("model file is corrupt: {0}")]
    CorruptFile(String),
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },
    #[error("native backend failed to load the model")]
    LoadFailed,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GenerationError {
    #[error("native inference call failed")]
    InferenceFailed,
    #[error("stream already ended")]
    StreamEnded,
    #[error("prompt is empty")]
    PromptEmpty,
    #[error("a stream is already active on this worker")]
    StreamAlreadyActive,
    #[error("generation timed out")]
    Timeout,
    #[error("generation was cancelled")]
    Cancelled,
    #[error("validation failed after recovery: {0}")]
    SchemaValidationFailed(String),
    #[error("exceeded maximum tool-calling rounds")]
    MaxToolRoundsExceeded,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemoryError {
    #[error("native backend ran out of memory")]
    OutOfMemory,
    #[error("configured memory limit exceeded")]
    MemoryLimitExceeded,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("parameter {name} out of range: {value} (expected {expected})")]
    OutOfRange {
        name: String,
        value: String,
        expected: String,
    },
    #[error("invalid tool name: {0}")]
    InvalidToolName(String),
    #[error("invalid JSON schema: {0}")]
    InvalidSchema(String),
    #[error("operation not implemented by the backend")]
    NotImplemented,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DownloadError {
    #[error("HTTP error: status {0}")]
    Http(u16),
    #[error("network error after {attempts} attempts: {message}")]
    NetworkRetriesExhausted { attempts: u32, message: String },
    #[error("insufficient disk space: need {needed} bytes, have {available}")]
    InsufficientDiskSpace { needed: u64, available: u64 },
    #[error("checksum verification failed")]
    VerifyFailed,
    #[error("download cancelled")]
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VisionError {
    #[error("companion mmproj descriptor is missing")]
    MmprojMissing,
    #[error("byte count {got} does not match {width}x{height} RGB ({expected} expected)")]
    WrongByteCount {
        got: usize,
        expected: usize,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("model {0} is not an embedding model")]
    NotAnEmbedder(String),
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
