//! Model Advisor: memory estimation and use-case scoring (spec.md §4.7).

pub mod gguf_introspect;
pub mod memory;
pub mod registry;
pub mod scoring;

pub use gguf_introspect::describe_gguf_file;
pub use memory::{estimate_memory, MemoryEstimate};
pub use registry::ModelRegistry;
pub use scoring::{score_model, ModelScore, UseCase};
