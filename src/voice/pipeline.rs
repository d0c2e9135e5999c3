//! Voice pipeline state machine (spec.md §4.6).
//!
//! Grounded on the worker's own re-entrancy-guard discipline in
//! `src/web/worker/worker_main.rs`: exactly one active state at a time,
//! transitions driven by a handful of owning entry points, never by
//! external mutation of the state field. `pause`/`resume` add a second,
//! orthogonal guard on top of that state machine — the worker has no
//! equivalent, since it has no "suspend without losing place" requirement;
//! it is grounded instead on spec.md §4.6's mic pause/resume wording.

use crate::scheduler::QosLevel;

use super::vad::EnergyVad;

/// The six pipeline states (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Listening,
    Transcribing,
    Thinking,
    Speaking,
    Error,
}

/// Frames of silence required after speech before endpointing (spec.md §4.6
/// default `silence_duration` of 1s at a 100ms frame size).
const SILENCE_ENDPOINT_FRAMES: u32 = 10;
/// Minimum frames of detected speech before an utterance can endpoint
/// (spec.md §4.6: "at least 0.8s of detected speech").
const MIN_SPEECH_FRAMES: u32 = 8;
/// Frames of silence while waiting for speech to start before giving up and
/// returning to `Idle` (spec.md §4.6: 30s silence timeout).
const SILENCE_TIMEOUT_FRAMES: u32 = 300;
/// Minimum time `Speaking` must hold before returning to `Listening`, so the
/// mic doesn't immediately pick up the tail of TTS playback (spec.md §4.6:
/// 800ms TTS cooldown).
const TTS_COOLDOWN_MS: i64 = 800;

/// Turn-marker tokens stripped from text before it's handed to TTS (spec.md
/// §4.6: "special-token sanitization"). Covers the llama3, chatML, and
/// gemma wire formats this crate's chat templates emit (spec.md §6).
const SPECIAL_TOKENS: &[&str] = &[
    "<|begin_of_text|>",
    "<|start_header_id|>",
    "<|end_header_id|>",
    "<|eot_id|>",
    "<|im_start|>",
    "<|im_end|>",
    "<start_of_turn>",
    "<end_of_turn>",
];

/// Strips chat-template turn markers from text before it's spoken. A model
/// that echoes its own role header (a known small-model failure mode) must
/// not have that header read aloud.
pub fn sanitize_for_speech(text: &str) -> String {
    let mut out = text.to_string();
    for token in SPECIAL_TOKENS {
        out = out.replace(token, "");
    }
    out.trim().to_string()
}

#[derive(Debug)]
pub struct VoicePipeline {
    state: VoiceState,
    vad: EnergyVad,
    buffered_samples: Vec<i16>,
    speech_started: bool,
    speech_frames: u32,
    consecutive_silence_frames: u32,
    silence_since_listening_frames: u32,
    speaking_started_ms: Option<i64>,
    paused_from: Option<VoiceState>,
}

impl VoicePipeline {
    pub fn new(vad: EnergyVad) -> Self {
        Self {
            state: VoiceState::Idle,
            vad,
            buffered_samples: Vec::new(),
            speech_started: false,
            speech_frames: 0,
            consecutive_silence_frames: 0,
            silence_since_listening_frames: 0,
            speaking_started_ms: None,
            paused_from: None,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Whether `pause` has suspended processing. Audio fed while paused is
    /// dropped; the state the pipeline was in when paused is preserved.
    pub fn is_paused(&self) -> bool {
        self.paused_from.is_some()
    }

    /// The mic should be capturing only while `Listening`; every other
    /// state (transcribing, thinking, speaking) is mid-turn and must not
    /// pick up new audio.
    pub fn mic_should_capture(&self) -> bool {
        !self.is_paused() && self.state == VoiceState::Listening
    }

    pub fn start_listening(&mut self) {
        self.state = VoiceState::Listening;
        self.reset_listening_counters();
    }

    fn reset_listening_counters(&mut self) {
        self.buffered_samples.clear();
        self.speech_started = false;
        self.speech_frames = 0;
        self.consecutive_silence_frames = 0;
        self.silence_since_listening_frames = 0;
    }

    /// Feeds one ~100ms audio frame. A no-op outside `Listening`, or while
    /// paused.
    pub fn feed_audio(&mut self, frame: &[i16]) {
        if self.is_paused() || self.state != VoiceState::Listening {
            return;
        }

        let is_speech = self.vad.is_speech(frame);

        if is_speech {
            self.buffered_samples.extend_from_slice(frame);
            self.speech_started = true;
            self.speech_frames += 1;
            self.consecutive_silence_frames = 0;
            self.silence_since_listening_frames = 0;
            return;
        }

        if !self.speech_started {
            self.silence_since_listening_frames += 1;
            if self.silence_since_listening_frames >= SILENCE_TIMEOUT_FRAMES {
                self.state = VoiceState::Idle;
                self.reset_listening_counters();
            }
            return;
        }

        self.buffered_samples.extend_from_slice(frame);
        self.consecutive_silence_frames += 1;
        if self.consecutive_silence_frames < SILENCE_ENDPOINT_FRAMES {
            return;
        }

        if self.speech_frames >= MIN_SPEECH_FRAMES {
            self.state = VoiceState::Transcribing;
        } else {
            // Too short to count as an utterance; keep listening for the
            // real one instead of transcribing a cough or a door slam.
            self.reset_listening_counters();
        }
    }

    /// Takes the buffered utterance for transcription. Only valid in
    /// `Transcribing`; returns `None` otherwise.
    pub fn take_utterance(&mut self) -> Option<Vec<i16>> {
        if self.state != VoiceState::Transcribing {
            return None;
        }
        Some(std::mem::take(&mut self.buffered_samples))
    }

    pub fn begin_thinking(&mut self) {
        if self.state == VoiceState::Transcribing {
            self.state = VoiceState::Thinking;
        }
    }

    /// Transitions to `Speaking`, first consulting `qos_level` (spec.md
    /// §4.6: "consult the scheduler before speaking"). If the scheduler has
    /// paused the device, the turn is abandoned back to `Listening` instead
    /// of speaking, and this returns `false`.
    pub fn begin_speaking(&mut self, now_ms: i64, qos_level: impl FnOnce() -> QosLevel) -> bool {
        if self.state != VoiceState::Thinking {
            return false;
        }
        if qos_level() == QosLevel::Paused {
            self.start_listening();
            return false;
        }
        self.state = VoiceState::Speaking;
        self.speaking_started_ms = Some(now_ms);
        true
    }

    /// Returns to `Listening` for the next utterance, once the TTS cooldown
    /// has elapsed. Returns `false` (staying in `Speaking`) if called too
    /// soon; callers should retry.
    pub fn finish_speaking(&mut self, now_ms: i64) -> bool {
        if self.state != VoiceState::Speaking {
            return false;
        }
        let started = self.speaking_started_ms.unwrap_or(now_ms);
        if now_ms - started < TTS_COOLDOWN_MS {
            return false;
        }
        self.speaking_started_ms = None;
        self.start_listening();
        true
    }

    /// Moves to `Error` from any state, discarding any buffered audio.
    pub fn fail(&mut self) {
        self.state = VoiceState::Error;
        self.buffered_samples.clear();
        self.speaking_started_ms = None;
    }

    /// Suspends audio processing without losing the current state.
    /// Re-entrant: a second `pause` while already paused is a no-op.
    pub fn pause(&mut self) {
        if self.paused_from.is_none() {
            self.paused_from = Some(self.state);
        }
    }

    /// Lifts a `pause`. A no-op if not currently paused.
    pub fn resume(&mut self) {
        self.paused_from = None;
    }

    /// Resets to `Idle` from any state (including `Error` or while paused),
    /// discarding buffered audio and clearing the pause guard.
    pub fn stop(&mut self) {
        self.state = VoiceState::Idle;
        self.paused_from = None;
        self.speaking_started_ms = None;
        self.reset_listening_counters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud_frame() -> Vec<i16> {
        vec![i16::MAX / 2; 160]
    }

    fn silent_frame() -> Vec<i16> {
        vec![0i16; 160]
    }

    fn speak_enough(pipeline: &mut VoicePipeline) {
        for _ in 0..MIN_SPEECH_FRAMES {
            pipeline.feed_audio(&loud_frame());
        }
    }

    fn endpoint(pipeline: &mut VoicePipeline) {
        for _ in 0..SILENCE_ENDPOINT_FRAMES {
            pipeline.feed_audio(&silent_frame());
        }
    }

    #[test]
    fn idle_pipeline_ignores_audio() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.feed_audio(&loud_frame());
        assert_eq!(pipeline.state(), VoiceState::Idle);
    }

    #[test]
    fn a_short_speech_blip_does_not_endpoint() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        pipeline.feed_audio(&loud_frame()); // only one frame, below MIN_SPEECH_FRAMES
        endpoint(&mut pipeline);
        assert_eq!(pipeline.state(), VoiceState::Listening);
    }

    #[test]
    fn sustained_speech_then_silence_endpoints_the_utterance() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        speak_enough(&mut pipeline);
        endpoint(&mut pipeline);
        assert_eq!(pipeline.state(), VoiceState::Transcribing);
    }

    #[test]
    fn brief_silence_does_not_endpoint() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        speak_enough(&mut pipeline);
        pipeline.feed_audio(&silent_frame());
        assert_eq!(pipeline.state(), VoiceState::Listening);
    }

    #[test]
    fn thirty_seconds_of_silence_with_no_speech_returns_to_idle() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        for _ in 0..SILENCE_TIMEOUT_FRAMES {
            pipeline.feed_audio(&silent_frame());
        }
        assert_eq!(pipeline.state(), VoiceState::Idle);
    }

    #[test]
    fn full_cycle_returns_to_listening_after_the_tts_cooldown() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        speak_enough(&mut pipeline);
        endpoint(&mut pipeline);

        let utterance = pipeline.take_utterance().unwrap();
        assert!(!utterance.is_empty());

        pipeline.begin_thinking();
        assert!(pipeline.begin_speaking(0, || QosLevel::Full));
        assert!(!pipeline.finish_speaking(100)); // cooldown not elapsed yet
        assert_eq!(pipeline.state(), VoiceState::Speaking);
        assert!(pipeline.finish_speaking(800));
        assert_eq!(pipeline.state(), VoiceState::Listening);
    }

    #[test]
    fn a_paused_device_aborts_speaking_back_to_listening() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        speak_enough(&mut pipeline);
        endpoint(&mut pipeline);
        pipeline.take_utterance();
        pipeline.begin_thinking();

        assert!(!pipeline.begin_speaking(0, || QosLevel::Paused));
        assert_eq!(pipeline.state(), VoiceState::Listening);
    }

    #[test]
    fn take_utterance_outside_transcribing_returns_none() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        assert!(pipeline.take_utterance().is_none());
    }

    #[test]
    fn stop_resets_to_idle_from_any_state() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        pipeline.feed_audio(&loud_frame());
        pipeline.stop();
        assert_eq!(pipeline.state(), VoiceState::Idle);
    }

    #[test]
    fn stop_recovers_from_error() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        pipeline.fail();
        assert_eq!(pipeline.state(), VoiceState::Error);
        pipeline.stop();
        assert_eq!(pipeline.state(), VoiceState::Idle);
    }

    #[test]
    fn pausing_suspends_audio_and_is_idempotent_on_re_entry() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        pipeline.start_listening();
        pipeline.pause();
        pipeline.pause(); // re-entrant no-op
        pipeline.feed_audio(&loud_frame());
        assert_eq!(pipeline.state(), VoiceState::Listening); // unaffected, audio dropped
        pipeline.resume();
        speak_enough(&mut pipeline);
        endpoint(&mut pipeline);
        assert_eq!(pipeline.state(), VoiceState::Transcribing);
    }

    #[test]
    fn mic_should_capture_only_while_actively_listening() {
        let mut pipeline = VoicePipeline::new(EnergyVad::new(0.1));
        assert!(!pipeline.mic_should_capture());
        pipeline.start_listening();
        assert!(pipeline.mic_should_capture());
        speak_enough(&mut pipeline);
        endpoint(&mut pipeline);
        assert!(!pipeline.mic_should_capture());
    }

    #[test]
    fn sanitize_for_speech_strips_chat_template_markers() {
        let text = "<|start_header_id|>assistant<|end_header_id|>\n\nhello there<|eot_id|>";
        assert_eq!(sanitize_for_speech(text), "assistant\n\nhello there");
    }
}
