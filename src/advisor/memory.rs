//! Memory footprint estimator (spec.md §4.7).
//!
//! Grounded on the teacher's GGUF introspection in `src/web/models.rs`
//! (`read_gguf_basic_metadata`, `format_parameter_count`): the teacher reads
//! parameter count and quantization straight from the file to decide whether
//! a model is plausible for a device. This estimator takes the same facts
//! (`ModelDescriptor::params_billions`, `size_bytes`, `family`) and turns
//! them into spec.md §4.7's exact weights + KV-cache + GPU-buffer +
//! runtime-overhead total, scaled by a 1.3x safety margin — except for
//! non-generative families (whisper, embedding), which have no KV cache or
//! GPU buffer at all and use a flat file-size-plus-overhead estimate.

use crate::types::{KvQuant, ModelDescriptor, ModelFamily};

const MIB: f64 = 1024.0 * 1024.0;

/// Fraction of on-disk size actually resident as dequantized weights once
/// loaded (spec.md §4.7).
const WEIGHTS_FRACTION: f64 = 0.15;
/// Safety margin applied to the generative-model total (spec.md §4.7).
const SAFETY_MARGIN: f64 = 1.3;
/// KV cache, MiB per billion params at a 2048-token context and F16
/// (spec.md §4.7: `params_B × 4 × (context/2048) × kv_quant_factor`).
const KV_MIB_PER_BILLION_PARAMS: f64 = 4.0;
const KV_REFERENCE_CONTEXT: f64 = 2048.0;
/// GPU staging buffer, MiB per billion params (spec.md §4.7).
const GPU_MIB_PER_BILLION_PARAMS: f64 = 80.0;
/// Fixed allowance for the runtime's own bookkeeping when a model is loaded
/// generatively (spec.md §4.7).
const RUNTIME_OVERHEAD_BYTES: u64 = 150 * 1024 * 1024;
/// Flat overhead added on top of on-disk size for non-generative families
/// (spec.md §4.7).
const NON_GENERATIVE_OVERHEAD_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct MemoryEstimate {
    pub weights_bytes: u64,
    pub kv_cache_bytes: u64,
    pub gpu_buffer_bytes: u64,
    pub runtime_overhead_bytes: u64,
    /// Safety margin already folded into `total_bytes()`: 1.3 for
    /// generative families, 1.0 for non-generative ones (spec.md §4.7).
    margin: f64,
}

impl MemoryEstimate {
    pub fn total_bytes(&self) -> u64 {
        let sum = self.weights_bytes + self.kv_cache_bytes + self.gpu_buffer_bytes + self.runtime_overhead_bytes;
        (sum as f64 * self.margin).round() as u64
    }
}

/// A family with no KV cache or GPU residency: whisper-style STT and
/// embedding models run single-pass over the whole input rather than
/// autoregressively decoding against a growing cache (spec.md §4.7).
fn is_non_generative(family: ModelFamily) -> bool {
    matches!(family, ModelFamily::Whisper | ModelFamily::MiniLm)
}

pub fn estimate_memory(
    descriptor: &ModelDescriptor,
    context_length: u32,
    kv_quant_k: KvQuant,
    kv_quant_v: KvQuant,
    gpu: bool,
) -> MemoryEstimate {
    if is_non_generative(descriptor.family) {
        return MemoryEstimate {
            weights_bytes: descriptor.size_bytes,
            kv_cache_bytes: 0,
            gpu_buffer_bytes: 0,
            runtime_overhead_bytes: NON_GENERATIVE_OVERHEAD_BYTES,
            margin: 1.0,
        };
    }

    let weights_bytes = (descriptor.size_bytes as f64 * WEIGHTS_FRACTION).round() as u64;

    let kv_quant_factor = (kv_quant_k.memory_factor() + kv_quant_v.memory_factor()) / 2.0;
    let kv_cache_mib =
        descriptor.params_billions * KV_MIB_PER_BILLION_PARAMS * (context_length as f64 / KV_REFERENCE_CONTEXT) * kv_quant_factor;
    let kv_cache_bytes = (kv_cache_mib * MIB).round() as u64;

    let gpu_buffer_bytes = if gpu {
        (descriptor.params_billions * GPU_MIB_PER_BILLION_PARAMS * MIB).round() as u64
    } else {
        0
    };

    MemoryEstimate {
        weights_bytes,
        kv_cache_bytes,
        gpu_buffer_bytes,
        runtime_overhead_bytes: RUNTIME_OVERHEAD_BYTES,
        margin: SAFETY_MARGIN,
    }
}
