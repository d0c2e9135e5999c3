//! The native inference backend boundary (spec.md §6).
//!
//! The real backend is a C-ABI library (a llama.cpp-family build) treated as
//! an opaque external dependency (spec.md §1). This trait is that boundary's
//! Rust face: every method signature mirrors the C-ABI shape spec.md §6
//! lists. A concrete implementation links the native library and marshals
//! through `crate::ffi::scopes`; a `FakeBackend` (this module, test-only)
//! implements the same trait entirely in memory so the worker and scheduler
//! can be exercised without any native code.

use crate::types::{BackendSelector, FlashAttentionMode, KvQuant};

/// Config struct handed to `init`/`vision_init` (spec.md §6).
#[derive(Debug, Clone)]
pub struct NativeConfig {
    pub model_path: String,
    pub backend: BackendSelector,
    pub n_threads: u32,
    pub context_size: u32,
    pub batch_size: u32,
    pub memory_limit_bytes: u64,
    pub gpu_layers: u32,
    pub use_mmap: bool,
    pub use_mlock: bool,
    pub seed: Option<i64>,
    pub flash_attention: FlashAttentionMode,
    pub kv_quant_k: KvQuant,
    pub kv_quant_v: KvQuant,
}

/// Generation params handed to `generate`/`generate_stream` (spec.md §6).
#[derive(Debug, Clone)]
pub struct NativeGenParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub stop_sequences: Vec<String>,
    pub grammar: Option<String>,
}

/// Integer error codes returned by the native backend (spec.md §6, exhaustive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeErrorCode {
    Success,
    InvalidParam,
    OutOfMemory,
    ModelLoadFailed,
    BackendInitFailed,
    InferenceFailed,
    ContextInvalid,
    StreamEnded,
    NotImplemented,
    MemoryLimitExceeded,
    UnsupportedBackend,
    Unknown(i32),
}

impl From<i32> for NativeErrorCode {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Success,
            -1 => Self::InvalidParam,
            -2 => Self::OutOfMemory,
            -3 => Self::ModelLoadFailed,
            -4 => Self::BackendInitFailed,
            -5 => Self::InferenceFailed,
            -6 => Self::ContextInvalid,
            -7 => Self::StreamEnded,
            -8 => Self::NotImplemented,
            -9 => Self::MemoryLimitExceeded,
            -10 => Self::UnsupportedBackend,
            other => Self::Unknown(other),
        }
    }
}

/// Opaque handle to a loaded native inference context.
/// Concrete implementations store whatever pointer/id the native library
/// returned; the trait never exposes the representation.
pub trait NativeHandle: Send {}

/// Opaque handle to an in-progress native streaming generation.
pub trait NativeStream: Send {}

/// Memory usage as reported by `get_memory_usage` (spec.md §6).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeMemoryStats {
    pub current_bytes: u64,
    pub peak_bytes: u64,
    pub limit_bytes: u64,
    pub model_bytes: u64,
    pub context_bytes: u64,
}

/// One step of a streaming generation.
pub enum NativeStreamStep {
    Token(String),
    EndOfStream,
}

/// The native backend's C-ABI surface (spec.md §6), as a Rust trait.
pub trait InferenceBackend: Send + Sync {
    type Handle: NativeHandle;
    type Stream: NativeStream;

    fn init(&self, config: &NativeConfig) -> Result<Self::Handle, NativeErrorCode>;
    fn free(&self, handle: Self::Handle);

    fn generate(
        &self,
        handle: &Self::Handle,
        prompt: &str,
        params: &NativeGenParams,
    ) -> Result<String, NativeErrorCode>;

    fn generate_stream(
        &self,
        handle: &Self::Handle,
        prompt: &str,
        params: &NativeGenParams,
    ) -> Result<Self::Stream, NativeErrorCode>;

    fn stream_next(&self, stream: &mut Self::Stream) -> Result<NativeStreamStep, NativeErrorCode>;
    fn stream_cancel(&self, stream: &mut Self::Stream);
    fn stream_free(&self, stream: Self::Stream);

    fn embed(&self, handle: &Self::Handle, text: &str) -> Result<Vec<f32>, NativeErrorCode>;

    fn vision_describe(
        &self,
        handle: &Self::Handle,
        rgb: &[u8],
        width: u32,
        height: u32,
        prompt: &str,
        params: &NativeGenParams,
    ) -> Result<String, NativeErrorCode>;

    fn memory_usage(&self, handle: &Self::Handle) -> Result<NativeMemoryStats, NativeErrorCode>;

    /// Transcribes 16kHz mono PCM16 samples to text (spec.md §4.6, STT).
    fn transcribe(&self, handle: &Self::Handle, pcm16_mono_16khz: &[i16]) -> Result<String, NativeErrorCode>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    //! In-memory fake backend for tests (no native library linked).

    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;

    pub struct FakeHandle {
        pub loaded_path: String,
        pub closed: Arc<AtomicBool>,
    }
    impl NativeHandle for FakeHandle {}

    pub struct FakeStream {
        remaining: Vec<String>,
        cancelled: Arc<AtomicBool>,
        cursor: usize,
    }
    impl NativeStream for FakeStream {}

    /// A backend that "generates" by echoing whitespace-split words from the
    /// prompt, one token-step at a time, up to `max_tokens`. Deterministic and
    /// dependency-free — enough to exercise the worker's streaming and
    /// cancellation logic end to end.
    #[derive(Default)]
    pub struct FakeBackend {
        pub fail_init: AtomicBool,
        pub handles_open: AtomicU64,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl InferenceBackend for FakeBackend {
        type Handle = FakeHandle;
        type Stream = FakeStream;

        fn init(&self, config: &NativeConfig) -> Result<Self::Handle, NativeErrorCode> {
            if self.fail_init.load(Ordering::SeqCst) {
                return Err(NativeErrorCode::ModelLoadFailed);
            }
            self.handles_open.fetch_add(1, Ordering::SeqCst);
            Ok(FakeHandle {
                loaded_path: config.model_path.clone(),
                closed: Arc::new(AtomicBool::new(false)),
            })
        }

        fn free(&self, handle: Self::Handle) {
            handle.closed.store(true, Ordering::SeqCst);
            self.handles_open.fetch_sub(1, Ordering::SeqCst);
        }

        fn generate(
            &self,
            _handle: &Self::Handle,
            prompt: &str,
            params: &NativeGenParams,
        ) -> Result<String, NativeErrorCode> {
            if prompt.is_empty() {
                return Err(NativeErrorCode::InvalidParam);
            }
            let words: Vec<&str> = prompt.split_whitespace().collect();
            let n = (params.max_tokens as usize).min(words.len().max(1));
            Ok(words.iter().cycle().take(n).copied().collect::<Vec<_>>().join(" "))
        }

        fn generate_stream(
            &self,
            _handle: &Self::Handle,
            prompt: &str,
            params: &NativeGenParams,
        ) -> Result<Self::Stream, NativeErrorCode> {
            if prompt.is_empty() {
                return Err(NativeErrorCode::InvalidParam);
            }
            let words: Vec<String> = prompt.split_whitespace().map(String::from).collect();
            let n = params.max_tokens as usize;
            let remaining: Vec<String> = words.iter().cloned().cycle().take(n.max(1)).collect();
            Ok(FakeStream {
                remaining,
                cancelled: Arc::new(AtomicBool::new(false)),
                cursor: 0,
            })
        }

        fn stream_next(&self, stream: &mut Self::Stream) -> Result<NativeStreamStep, NativeErrorCode> {
            if stream.cancelled.load(Ordering::SeqCst) {
                return Ok(NativeStreamStep::EndOfStream);
            }
            if stream.cursor >= stream.remaining.len() {
                return Ok(NativeStreamStep::EndOfStream);
            }
            let token = stream.remaining[stream.cursor].clone();
            stream.cursor += 1;
            Ok(NativeStreamStep::Token(format!("{token} ")))
        }

        fn stream_cancel(&self, stream: &mut Self::Stream) {
            stream.cancelled.store(true, Ordering::SeqCst);
        }

        fn stream_free(&self, _stream: Self::Stream) {}

        fn embed(&self, _handle: &Self::Handle, text: &str) -> Result<Vec<f32>, NativeErrorCode> {
            Ok(vec![text.len() as f32; 8])
        }

        fn vision_describe(
            &self,
            _handle: &Self::Handle,
            rgb: &[u8],
            width: u32,
            height: u32,
            _prompt: &str,
            _params: &NativeGenParams,
        ) -> Result<String, NativeErrorCode> {
            let expected = (width as usize) * (height as usize) * 3;
            if rgb.len() != expected {
                return Err(NativeErrorCode::InvalidParam);
            }
            Ok(format!("a {width}x{height} image"))
        }

        fn memory_usage(&self, _handle: &Self::Handle) -> Result<NativeMemoryStats, NativeErrorCode> {
            Ok(NativeMemoryStats {
                current_bytes: 100,
                peak_bytes: 150,
                limit_bytes: 1024,
                model_bytes: 80,
                context_bytes: 20,
            })
        }

        fn transcribe(&self, _handle: &Self::Handle, pcm16_mono_16khz: &[i16]) -> Result<String, NativeErrorCode> {
            if pcm16_mono_16khz.is_empty() {
                return Err(NativeErrorCode::InvalidParam);
            }
            Ok(format!("[{} samples transcribed]", pcm16_mono_16khz.len()))
        }
    }
}
