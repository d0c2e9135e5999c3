//! Native error code → `RuntimeError` mapping (spec.md §6, §7).
//!
//! The teacher has no analogous table (its FFI calls panic or log-and-string
//! on failure in `src/web/chat/generation.rs`); this is a literal transcription
//! of spec.md §6's code table into an exhaustive match, kept separate from
//! `backend.rs` so the mapping is auditable on its own.

use crate::error::{GenerationError, MemoryError, ModelLoadError, RuntimeError};
use crate::ffi::backend::NativeErrorCode;

/// Maps a native error code returned from `init`/`vision_init` to a
/// `RuntimeError::ModelLoad` (or other variant, if the code indicates
/// a non-load failure surfaced early, e.g. `MemoryLimitExceeded`).
pub fn map_init_error(code: NativeErrorCode, model_path: &str) -> RuntimeError {
    match code {
        NativeErrorCode::ModelLoadFailed => {
            ModelLoadError::CorruptFile(model_path.to_string()).into()
        }
        NativeErrorCode::InvalidParam => ModelLoadError::MissingFile(model_path.to_string()).into(),
        NativeErrorCode::OutOfMemory => MemoryError::OutOfMemory.into(),
        NativeErrorCode::MemoryLimitExceeded => MemoryError::MemoryLimitExceeded.into(),
        NativeErrorCode::BackendInitFailed | NativeErrorCode::UnsupportedBackend => {
            ModelLoadError::LoadFailed.into()
        }
        NativeErrorCode::Success => {
            unreachable!("map_init_error called with a success code")
        }
        NativeErrorCode::Unknown(raw) => RuntimeError::UnknownBackendCode(raw),
        other => RuntimeError::UnknownBackendCode(code_to_raw(other)),
    }
}

/// Maps a native error code returned from `generate`/`generate_stream`/`stream_next`.
pub fn map_generation_error(code: NativeErrorCode) -> RuntimeError {
    match code {
        NativeErrorCode::InferenceFailed => GenerationError::InferenceFailed.into(),
        NativeErrorCode::StreamEnded => GenerationError::StreamEnded.into(),
        NativeErrorCode::InvalidParam => GenerationError::PromptEmpty.into(),
        NativeErrorCode::ContextInvalid => GenerationError::InferenceFailed.into(),
        NativeErrorCode::OutOfMemory => MemoryError::OutOfMemory.into(),
        NativeErrorCode::MemoryLimitExceeded => MemoryError::MemoryLimitExceeded.into(),
        NativeErrorCode::NotImplemented => GenerationError::InferenceFailed.into(),
        NativeErrorCode::Success => unreachable!("map_generation_error called with a success code"),
        NativeErrorCode::Unknown(raw) => RuntimeError::UnknownBackendCode(raw),
        other => RuntimeError::UnknownBackendCode(code_to_raw(other)),
    }
}

fn code_to_raw(code: NativeErrorCode) -> i32 {
    match code {
        NativeErrorCode::Success => 0,
        NativeErrorCode::InvalidParam => -1,
        NativeErrorCode::OutOfMemory => -2,
        NativeErrorCode::ModelLoadFailed => -3,
        NativeErrorCode::BackendInitFailed => -4,
        NativeErrorCode::InferenceFailed => -5,
        NativeErrorCode::ContextInvalid => -6,
        NativeErrorCode::StreamEnded => -7,
        NativeErrorCode::NotImplemented => -8,
        NativeErrorCode::MemoryLimitExceeded => -9,
        NativeErrorCode::UnsupportedBackend => -10,
        NativeErrorCode::Unknown(raw) => raw,
    }
}
