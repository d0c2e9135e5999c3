//! An utterance captured by `VoicePipeline`'s VAD endpointing handed
//! straight to `SpeechSession::transcribe`, the way a host would wire a
//! capture thread to the STT backend.

use std::sync::Arc;

use edge_veda_runtime::ffi::backend::fake::FakeBackend;
use edge_veda_runtime::ffi::backend::NativeConfig;
use edge_veda_runtime::ffi::InferenceBackend;
use edge_veda_runtime::scheduler::QosLevel;
use edge_veda_runtime::speech::SpeechSession;
use edge_veda_runtime::types::{BackendSelector, FlashAttentionMode, KvQuant};
use edge_veda_runtime::voice::{EnergyVad, VoicePipeline, VoiceState};

fn loud_frame() -> Vec<i16> {
    vec![i16::MAX / 2; 160]
}

fn silent_frame() -> Vec<i16> {
    vec![0i16; 160]
}

#[test]
fn an_endpointed_utterance_transcribes_through_the_speech_session() {
    let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
    pipeline.start_listening();
    for _ in 0..8 {
        pipeline.feed_audio(&loud_frame());
    }
    for _ in 0..10 {
        pipeline.feed_audio(&silent_frame());
    }
    assert_eq!(pipeline.state(), VoiceState::Transcribing);

    let utterance = pipeline.take_utterance().expect("endpointed utterance should be available");
    assert!(!utterance.is_empty());

    let backend = Arc::new(FakeBackend::new());
    let config = NativeConfig {
        model_path: "whisper-tiny.bin".into(),
        backend: BackendSelector::Cpu,
        n_threads: 2,
        context_size: 512,
        batch_size: 8,
        memory_limit_bytes: 256 * 1024 * 1024,
        gpu_layers: 0,
        use_mmap: true,
        use_mlock: false,
        seed: None,
        flash_attention: FlashAttentionMode::Off,
        kv_quant_k: KvQuant::F16,
        kv_quant_v: KvQuant::F16,
    };
    let handle = backend.init(&config).unwrap();
    let session = SpeechSession::new(backend, handle);

    let transcript = session.transcribe(&utterance).unwrap();
    assert!(transcript.contains(&utterance.len().to_string()));

    pipeline.begin_thinking();
    assert!(pipeline.begin_speaking(0, || QosLevel::Full));
    assert!(pipeline.finish_speaking(800));
    assert_eq!(pipeline.state(), VoiceState::Listening);
}
