//! Native inference backend boundary (spec.md §6).

pub mod backend;
pub mod error_map;
pub mod scopes;

pub use backend::{
    InferenceBackend, NativeConfig, NativeErrorCode, NativeGenParams, NativeHandle,
    NativeMemoryStats, NativeStream, NativeStreamStep,
};
pub use scopes::{ScopedCString, ScopedHandle, ScopedOutputBuffer};
