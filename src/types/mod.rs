//! Core data model (spec.md §3).

pub mod device;
pub mod generation;
pub mod model;

pub use device::{DeviceProfile, SysinfoTelemetrySource, TelemetrySample, TelemetrySource, ThermalIndex};
pub use generation::{CancelToken, GenerationOptions, GrammarSpec, TerminalReason, TokenChunk};
pub use model::{
    BackendSelector, Capability, FlashAttentionMode, KvQuant, ModelDescriptor, ModelFamily,
    ModelFormat, ModelMetadataFile, Quantization, RuntimeConfig,
};
