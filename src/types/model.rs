//! Model descriptor and related enums (spec.md §3 "Model descriptor").
//!
//! Grounded on the teacher's GGUF-metadata-driven model introspection in
//! `src/web/models.rs` (`read_gguf_basic_metadata`, `parse_model_filename`),
//! which already extracts family/quantization/parameter-count facts from a
//! model file — the same facts this descriptor carries as first-class
//! fields rather than re-parsing a filename every time.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, RuntimeError};

/// Model family tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelFamily {
    Llama3,
    Phi3,
    Gemma2,
    Qwen3,
    TinyLlama,
    SmolVlm,
    Whisper,
    MiniLm,
}

/// On-disk model format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    Gguf,
    Ggml,
}

/// Quantization code. `Other` preserves codes this crate doesn't special-case
/// (e.g. for the memory estimator's kv-quant factor or quality penalty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    Q4KM,
    Q8_0,
    F16,
    Other(String),
}

impl Quantization {
    pub fn code(&self) -> &str {
        match self {
            Self::Q4KM => "Q4_K_M",
            Self::Q8_0 => "Q8_0",
            Self::F16 => "F16",
            Self::Other(s) => s,
        }
    }
}

/// Capability tags a model declares support for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Chat,
    Reasoning,
    ToolCalling,
    Vision,
    Stt,
    Embedding,
}

/// A model's immutable, constructed-once metadata.
///
/// Lifecycle: defined statically in a registry (see `crate::advisor::registry`)
/// or deserialized from a saved `{id}_metadata.json` sidecar file alongside a
/// downloaded blob (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique id, kebab-case by convention (not re-validated — registries are
    /// expected to enforce uniqueness at registration time).
    pub id: String,
    pub display_name: String,
    pub family: ModelFamily,
    pub size_bytes: u64,
    pub format: ModelFormat,
    pub quantization: Quantization,
    /// Quantization-neutral parameter count, in billions.
    pub params_billions: f64,
    pub sha256: Option<String>,
    pub download_url: Option<String>,
    pub max_context_length: u32,
    pub capabilities: Vec<Capability>,
    /// Companion descriptor id for a vision mmproj file, if this is a VLM.
    pub companion_id: Option<String>,
}

impl ModelDescriptor {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// File extension this model's blob is expected to use (spec.md §6).
    pub fn file_extension(&self) -> &'static str {
        match self.family {
            ModelFamily::Whisper => "bin",
            _ => "gguf",
        }
    }
}

/// Sidecar metadata written alongside a downloaded model blob (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadataFile {
    pub model: ModelDescriptor,
    #[serde(rename = "downloadedAt")]
    pub downloaded_at: String,
}

/// GPU backend selector for the native inference context (spec.md §6 config struct).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendSelector {
    Auto,
    Metal,
    Vulkan,
    Cpu,
}

/// Flash-attention mode (spec.md §3 "Runtime configuration").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashAttentionMode {
    Auto,
    Off,
    On,
}

/// KV-cache quantization code, independent for keys and values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KvQuant {
    F16,
    Q8_0,
    F32,
}

impl KvQuant {
    /// Memory factor used by the model advisor's KV-cache estimate
    /// (spec.md §4.7: F16 factor = 2.0, Q8_0 factor = 1.0).
    pub fn memory_factor(&self) -> f64 {
        match self {
            Self::F16 => 2.0,
            Self::Q8_0 => 1.0,
            Self::F32 => 4.0,
        }
    }
}

/// Immutable per-worker-lifetime runtime configuration (spec.md §3).
///
/// Invariant: `threads ∈ [1,32] ∧ context ∈ [128,32768] ∧ memory ≥ 256`,
/// enforced in `RuntimeConfig::new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub model_path: String,
    pub threads: u32,
    pub context_length: u32,
    pub gpu: bool,
    pub memory_budget_mib: u32,
    pub kv_quant_k: KvQuant,
    pub kv_quant_v: KvQuant,
    pub flash_attention: FlashAttentionMode,
    pub seed: Option<i64>,
    pub backend: BackendSelector,
}

impl RuntimeConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        model_path: impl Into<String>,
        threads: u32,
        context_length: u32,
        gpu: bool,
        memory_budget_mib: u32,
        kv_quant_k: KvQuant,
        kv_quant_v: KvQuant,
        flash_attention: FlashAttentionMode,
        seed: Option<i64>,
        backend: BackendSelector,
    ) -> Result<Self, RuntimeError> {
        if !(1..=32).contains(&threads) {
            return Err(ConfigError::OutOfRange {
                name: "threads".into(),
                value: threads.to_string(),
                expected: "1..=32".into(),
            }
            .into());
        }
        if !(128..=32768).contains(&context_length) {
            return Err(ConfigError::OutOfRange {
                name: "context_length".into(),
                value: context_length.to_string(),
                expected: "128..=32768".into(),
            }
            .into());
        }
        if memory_budget_mib < 256 {
            return Err(ConfigError::OutOfRange {
                name: "memory_budget_mib".into(),
                value: memory_budget_mib.to_string(),
                expected: ">=256".into(),
            }
            .into());
        }
        Ok(Self {
            model_path: model_path.into(),
            threads,
            context_length,
            gpu,
            memory_budget_mib,
            kv_quant_k,
            kv_quant_v,
            flash_attention,
            seed,
            backend,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> (u32, u32, bool, u32, KvQuant, KvQuant, FlashAttentionMode, Option<i64>, BackendSelector) {
        (4, 4096, false, 512, KvQuant::F16, KvQuant::F16, FlashAttentionMode::Auto, None, BackendSelector::Auto)
    }

    #[test]
    fn rejects_threads_out_of_range() {
        let (_, ctx, gpu, mem, kk, kv, fa, seed, be) = valid();
        let result = RuntimeConfig::new("m.gguf", 0, ctx, gpu, mem, kk, kv, fa, seed, be);
        assert!(result.is_err());
        let result = RuntimeConfig::new("m.gguf", 33, ctx, gpu, mem, kk, kv, fa, seed, be);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_context_out_of_range() {
        let (threads, _, gpu, mem, kk, kv, fa, seed, be) = valid();
        assert!(RuntimeConfig::new("m.gguf", threads, 127, gpu, mem, kk, kv, fa, seed, be).is_err());
        assert!(RuntimeConfig::new("m.gguf", threads, 32769, gpu, mem, kk, kv, fa, seed, be).is_err());
    }

    #[test]
    fn rejects_memory_below_256() {
        let (threads, ctx, gpu, _, kk, kv, fa, seed, be) = valid();
        assert!(RuntimeConfig::new("m.gguf", threads, ctx, gpu, 255, kk, kv, fa, seed, be).is_err());
    }

    #[test]
    fn accepts_boundary_values() {
        let (_, _, gpu, _, kk, kv, fa, seed, be) = valid();
        assert!(RuntimeConfig::new("m.gguf", 1, 128, gpu, 256, kk, kv, fa, seed, be).is_ok());
        assert!(RuntimeConfig::new("m.gguf", 32, 32768, gpu, 256, kk, kv, fa, seed, be).is_ok());
    }

    #[test]
    fn kv_quant_memory_factors_match_spec() {
        assert_eq!(KvQuant::F16.memory_factor(), 2.0);
        assert_eq!(KvQuant::Q8_0.memory_factor(), 1.0);
    }

    #[test]
    fn metadata_file_round_trips() {
        let descriptor = ModelDescriptor {
            id: "tinyllama-1b".into(),
            display_name: "TinyLlama 1.1B".into(),
            family: ModelFamily::TinyLlama,
            size_bytes: 700_000_000,
            format: ModelFormat::Gguf,
            quantization: Quantization::Q4KM,
            params_billions: 1.1,
            sha256: Some("abc123".into()),
            download_url: Some("https://example.com/model.gguf".into()),
            max_context_length: 2048,
            capabilities: vec![Capability::Chat],
            companion_id: None,
        };
        let file = ModelMetadataFile {
            model: descriptor,
            downloaded_at: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&file).unwrap();
        let parsed: ModelMetadataFile = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model.id, file.model.id);
        assert_eq!(parsed.downloaded_at, file.downloaded_at);
    }
}
