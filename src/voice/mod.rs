//! Voice pipeline: VAD-driven state machine (spec.md §4.6).

pub mod pipeline;
pub mod vad;

pub use pipeline::{sanitize_for_speech, VoicePipeline, VoiceState};
pub use vad::EnergyVad;
