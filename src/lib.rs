//! On-device inference runtime core: a worker thread model wrapping a native
//! quantized-LLM/VLM/STT backend, an adaptive scheduler that trades
//! fidelity for headroom under thermal/battery/latency pressure, and the
//! chat/vision/speech/voice session types built on top of it.
//!
//! Platform integrations (the native backend itself, telemetry collection,
//! model downloads over a real network) are supplied by the host
//! application; this crate defines the boundaries (`ffi::InferenceBackend`,
//! `types::TelemetrySource`) and everything above them.

pub mod advisor;
pub mod chat;
pub mod download;
pub mod error;
pub mod ffi;
pub mod logging;
pub mod scheduler;
pub mod speech;
pub mod types;
pub mod vision;
pub mod voice;
pub mod worker;

pub use error::{RuntimeError, RuntimeResult};
