//! Speech-to-text session (spec.md §4.6).
//!
//! Deliberately thin: STT here is request/response (hand a PCM buffer, get
//! text back), with none of the chat layer's templating or tool calling.
//! Grounded on the same `InferenceBackend` boundary as `VisionSession` —
//! a backend handle plus one focused call.

use std::sync::Arc;

use crate::error::{GenerationError, RuntimeError};
use crate::ffi::InferenceBackend;

pub struct SpeechSession<B: InferenceBackend> {
    backend: Arc<B>,
    handle: B::Handle,
}

impl<B: InferenceBackend> SpeechSession<B> {
    pub fn new(backend: Arc<B>, handle: B::Handle) -> Self {
        Self { backend, handle }
    }

    pub fn transcribe(&self, pcm16_mono_16khz: &[i16]) -> Result<String, RuntimeError> {
        if pcm16_mono_16khz.is_empty() {
            return Err(GenerationError::PromptEmpty.into());
        }
        self.backend
            .transcribe(&self.handle, pcm16_mono_16khz)
            .map_err(|_| RuntimeError::Generation(GenerationError::InferenceFailed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::backend::fake::FakeBackend;
    use crate::ffi::backend::NativeConfig;
    use crate::types::{BackendSelector, FlashAttentionMode, KvQuant};

    fn session() -> SpeechSession<FakeBackend> {
        let backend = Arc::new(FakeBackend::new());
        let config = NativeConfig {
            model_path: "whisper.bin".into(),
            backend: BackendSelector::Cpu,
            n_threads: 4,
            context_size: 0,
            batch_size: 0,
            memory_limit_bytes: 1 << 30,
            gpu_layers: 0,
            use_mmap: true,
            use_mlock: false,
            seed: None,
            flash_attention: FlashAttentionMode::Off,
            kv_quant_k: KvQuant::F16,
            kv_quant_v: KvQuant::F16,
        };
        let handle = backend.init(&config).unwrap();
        SpeechSession::new(backend, handle)
    }

    #[test]
    fn transcribes_nonempty_pcm() {
        let session = session();
        let samples = vec![0i16; 16_000];
        let text = session.transcribe(&samples).unwrap();
        assert!(text.contains("16000"));
    }

    #[test]
    fn empty_pcm_is_rejected() {
        let session = session();
        assert!(session.transcribe(&[]).is_err());
    }
}
