//! Four-dimensional weighted model scoring (spec.md §4.7).

use crate::types::{Capability, DeviceProfile, ModelDescriptor, Quantization};

/// The use-case a caller is selecting a model for; each weights the four
/// score dimensions differently (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UseCase {
    Chat,
    Reasoning,
    ToolCalling,
    Vision,
    Stt,
    Embedding,
    Fast,
}

#[derive(Debug, Clone, Copy)]
struct Weights {
    quality: f64,
    speed: f64,
    fit: f64,
    context: f64,
}

fn weights_for(use_case: UseCase) -> Weights {
    match use_case {
        UseCase::Chat => Weights { quality: 0.35, speed: 0.30, fit: 0.25, context: 0.10 },
        UseCase::Reasoning => Weights { quality: 0.50, speed: 0.15, fit: 0.25, context: 0.10 },
        UseCase::ToolCalling => Weights { quality: 0.40, speed: 0.25, fit: 0.25, context: 0.10 },
        UseCase::Vision => Weights { quality: 0.35, speed: 0.25, fit: 0.30, context: 0.10 },
        UseCase::Stt => Weights { quality: 0.30, speed: 0.40, fit: 0.25, context: 0.05 },
        UseCase::Embedding => Weights { quality: 0.25, speed: 0.40, fit: 0.30, context: 0.05 },
        UseCase::Fast => Weights { quality: 0.20, speed: 0.50, fit: 0.25, context: 0.05 },
    }
}

fn required_capability(use_case: UseCase) -> Capability {
    match use_case {
        UseCase::Chat | UseCase::Fast => Capability::Chat,
        UseCase::Reasoning => Capability::Reasoning,
        UseCase::ToolCalling => Capability::ToolCalling,
        UseCase::Vision => Capability::Vision,
        UseCase::Stt => Capability::Stt,
        UseCase::Embedding => Capability::Embedding,
    }
}

/// Baseline quality per model family, before parameter-count and
/// quantization adjustments. Not given by spec.md as concrete numbers;
/// chosen to rank newer, larger-context instruction families above the
/// small/distilled ones they were trained to approximate (DESIGN.md).
fn family_baseline(family: crate::types::ModelFamily) -> f64 {
    use crate::types::ModelFamily::*;
    match family {
        Llama3 => 70.0,
        Qwen3 => 68.0,
        Phi3 => 65.0,
        Gemma2 => 65.0,
        SmolVlm => 60.0,
        Whisper => 55.0,
        MiniLm => 50.0,
        TinyLlama => 40.0,
    }
}

/// Relative speed multiplier from quantization: smaller on-disk
/// representations decode faster per spec.md's `quant_multiplier` term.
fn quant_multiplier(quantization: &Quantization) -> f64 {
    match quantization {
        Quantization::Q4KM => 1.2,
        Quantization::Q8_0 => 1.0,
        Quantization::F16 => 0.8,
        Quantization::Other(_) => 1.0,
    }
}

/// Quality penalty from quantization (spec.md §4.7: "Q4_K_M: −3").
fn quant_quality_penalty(quantization: &Quantization) -> f64 {
    match quantization {
        Quantization::Q4KM => 3.0,
        _ => 0.0,
    }
}

/// A model's score for a given use case on a given device, each dimension
/// on a 0-100 scale (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelScore {
    pub fit: f64,
    pub quality: f64,
    pub speed: f64,
    pub context: f64,
    pub composite: f64,
}

/// Fit dimension: a lookup on the percentage of the device's safe budget
/// the model's estimated memory footprint consumes (spec.md §4.7).
fn fit_score(budget_usage_percent: f64) -> f64 {
    if budget_usage_percent <= 50.0 {
        100.0
    } else if budget_usage_percent <= 70.0 {
        85.0
    } else if budget_usage_percent <= 85.0 {
        60.0
    } else if budget_usage_percent <= 100.0 {
        30.0
    } else {
        0.0
    }
}

/// Context dimension: a lookup on the model's max context length relative
/// to the caller's requested target (spec.md §4.7).
fn context_score(max_context_length: u32, target_context_length: u32) -> f64 {
    if target_context_length == 0 {
        return 20.0;
    }
    let ratio = max_context_length as f64 / target_context_length as f64;
    if ratio >= 2.0 {
        100.0
    } else if ratio >= 1.0 {
        80.0
    } else if ratio >= 0.5 {
        50.0
    } else {
        20.0
    }
}

/// Quality dimension: per-family baseline, log-scaled parameter bonus,
/// quantization penalty, capability-match bonus (spec.md §4.7).
fn quality_score(descriptor: &ModelDescriptor, use_case: UseCase) -> f64 {
    let baseline = family_baseline(descriptor.family);

    // log2-scaled against a 70B reference ceiling, capped at the spec's +15.
    let param_bonus = (descriptor.params_billions.max(0.01).log2() / 70f64.log2() * 15.0).clamp(0.0, 15.0);

    let quant_penalty = quant_quality_penalty(&descriptor.quantization);

    let capability_bonus = if descriptor.has_capability(required_capability(use_case)) { 10.0 } else { 0.0 };

    (baseline + param_bonus - quant_penalty + capability_bonus).clamp(0.0, 100.0)
}

/// Speed dimension: inverse-parameter-count throughput estimate scaled by
/// device chip speed and quantization (spec.md §4.7).
fn speed_score(descriptor: &ModelDescriptor, device: &DeviceProfile) -> f64 {
    let raw = 160.0 / descriptor.params_billions.max(0.01) * device.chip_multiplier * quant_multiplier(&descriptor.quantization);
    (raw * 2.0).clamp(0.0, 100.0)
}

/// Scores `descriptor` for `use_case` on `device`. `budget_usage_percent`
/// should be `estimate_memory(..).total_bytes() / device.safe_budget_bytes()
/// * 100.0`; `target_context_length` is the caller's requested context.
pub fn score_model(
    descriptor: &ModelDescriptor,
    use_case: UseCase,
    device: &DeviceProfile,
    budget_usage_percent: f64,
    target_context_length: u32,
) -> ModelScore {
    let weights = weights_for(use_case);

    let fit = fit_score(budget_usage_percent);
    let quality = quality_score(descriptor, use_case);
    let speed = speed_score(descriptor, device);
    let context = context_score(descriptor.max_context_length, target_context_length);

    let composite = weights.fit * fit + weights.quality * quality + weights.speed * speed + weights.context * context;

    ModelScore { fit, quality, speed, context, composite }
}
