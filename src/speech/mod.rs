//! Speech-to-text (spec.md §4.6).

pub mod session;

pub use session::SpeechSession;
