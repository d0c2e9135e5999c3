//! GGUF file introspection for populating a `ModelDescriptor` straight from
//! a downloaded model blob, without a hand-maintained catalog entry
//! (spec.md §4.7).
//!
//! Grounded on `src/web/gguf_utils.rs`'s `read_gguf_basic_metadata` (read
//! the GGUF key-value metadata block, falling back through a short list of
//! known key names per field) and `src/web/filename_patterns.rs`'s
//! filename-pattern fallback chain for whichever fact the metadata block
//! doesn't carry, or when the file can't be parsed as GGUF at all. Reads
//! with the `gguf-llms` crate exactly the way the teacher does:
//! `GgufHeader::parse` then `GgufReader::read_metadata`.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use gguf_llms::{GgufHeader, GgufReader, Value};

use crate::error::{ModelLoadError, RuntimeError};
use crate::types::{Capability, ModelDescriptor, ModelFamily, ModelFormat, Quantization};

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Uint8(n) => Some(n.to_string()),
        Value::Uint16(n) => Some(n.to_string()),
        Value::Uint32(n) => Some(n.to_string()),
        Value::Uint64(n) => Some(n.to_string()),
        Value::Int8(n) => Some(n.to_string()),
        Value::Int16(n) => Some(n.to_string()),
        Value::Int32(n) => Some(n.to_string()),
        Value::Int64(n) => Some(n.to_string()),
        Value::Float32(f) => Some(f.to_string()),
        Value::Float64(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_, _) => None,
    }
}

fn read_gguf_metadata(path: &Path) -> Result<HashMap<String, Value>, RuntimeError> {
    let file = File::open(path)
        .map_err(|_| RuntimeError::ModelLoad(ModelLoadError::MissingFile(path.display().to_string())))?;
    let mut reader = BufReader::new(file);
    let header = GgufHeader::parse(&mut reader)
        .map_err(|e| RuntimeError::ModelLoad(ModelLoadError::CorruptFile(e.to_string())))?;
    GgufReader::read_metadata(&mut reader, header.n_kv)
        .map_err(|e| RuntimeError::ModelLoad(ModelLoadError::CorruptFile(e.to_string())))
}

fn family_from_architecture(architecture: &str, filename: &str) -> ModelFamily {
    let arch = architecture.to_lowercase();
    let name = filename.to_lowercase();
    if arch.contains("qwen") || name.contains("qwen") {
        ModelFamily::Qwen3
    } else if arch.contains("gemma") || name.contains("gemma") {
        ModelFamily::Gemma2
    } else if arch.contains("phi") || name.contains("phi") {
        ModelFamily::Phi3
    } else if name.contains("tinyllama") {
        ModelFamily::TinyLlama
    } else if name.contains("smolvlm") {
        ModelFamily::SmolVlm
    } else if name.contains("whisper") {
        ModelFamily::Whisper
    } else if name.contains("minilm") || name.contains("embed") {
        ModelFamily::MiniLm
    } else {
        ModelFamily::Llama3
    }
}

fn quantization_from_code(code: &str) -> Quantization {
    match code.to_uppercase().as_str() {
        "Q4_K_M" => Quantization::Q4KM,
        "Q8_0" => Quantization::Q8_0,
        "F16" => Quantization::F16,
        other => Quantization::Other(other.to_string()),
    }
}

const FILENAME_QUANT_PATTERNS: &[&str] = &[
    "q8_0", "q6_k", "q5_k_m", "q5_k_s", "q5_1", "q5_0", "q4_k_m", "q4_k_s", "q4_1", "q4_0",
    "q3_k_m", "q3_k_s", "q2_k", "iq4_xs", "iq3_xxs", "iq2_xxs", "f16", "f32", "bf16",
];

fn quantization_from_filename(filename: &str) -> Option<Quantization> {
    let lower = filename.to_lowercase();
    FILENAME_QUANT_PATTERNS
        .iter()
        .find(|pattern| lower.contains(*pattern))
        .map(|pattern| quantization_from_code(pattern))
}

const FILENAME_PARAM_PATTERNS: &[&str] = &[
    "405b", "236b", "180b", "141b", "123b", "110b", "90b", "80b", "72b", "70b", "65b", "46b",
    "40b", "35b", "34b", "32b", "30b", "27b", "22b", "20b", "14b", "13b", "12b", "11b", "8b",
    "7b", "6b", "4.5b", "4b", "3.8b", "3b", "2.8b", "2b", "1.8b", "1b", "0.5b",
];

fn params_billions_from_filename(filename: &str) -> Option<f64> {
    let lower = filename.to_lowercase();
    FILENAME_PARAM_PATTERNS
        .iter()
        .find(|pattern| lower.contains(*pattern))
        .and_then(|pattern| pattern.trim_end_matches('b').parse::<f64>().ok())
}

/// Builds a `ModelDescriptor` by reading a GGUF file's embedded metadata,
/// falling back to filename heuristics for any fact the metadata block
/// doesn't carry, or if the file can't be parsed as GGUF at all. The blob's
/// own size on disk is always used for `size_bytes` regardless of what (if
/// anything) the metadata block reports.
pub fn describe_gguf_file(
    path: &Path,
    id: &str,
    download_url: Option<String>,
    sha256: Option<String>,
    capabilities: Vec<Capability>,
) -> Result<ModelDescriptor, RuntimeError> {
    let size_bytes = std::fs::metadata(path)
        .map_err(|_| RuntimeError::ModelLoad(ModelLoadError::MissingFile(path.display().to_string())))?
        .len();
    let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or(id);

    let metadata = read_gguf_metadata(path).ok();
    let get = |key: &str| metadata.as_ref().and_then(|m| m.get(key)).and_then(value_to_string);

    let architecture = get("general.architecture").or_else(|| get("general.arch"));
    let family = family_from_architecture(architecture.as_deref().unwrap_or(""), filename);

    let quantization = get("general.quantization_version")
        .as_deref()
        .and_then(quantization_from_filename)
        .or_else(|| quantization_from_filename(filename))
        .unwrap_or_else(|| Quantization::Other("Unknown".into()));

    let params_billions = get("general.parameter_count")
        .or_else(|| get("general.param_count"))
        .and_then(|raw| raw.parse::<f64>().ok())
        .map(|raw_params| raw_params / 1_000_000_000.0)
        .or_else(|| params_billions_from_filename(filename))
        .unwrap_or(0.0);

    let arch_key = architecture.unwrap_or_default();
    let max_context_length = get(&format!("{arch_key}.context_length"))
        .or_else(|| get("llama.context_length"))
        .or_else(|| get("context_length"))
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(4096);

    Ok(ModelDescriptor {
        id: id.to_string(),
        display_name: filename.to_string(),
        family,
        size_bytes,
        format: ModelFormat::Gguf,
        quantization,
        params_billions,
        sha256,
        download_url,
        max_context_length,
        capabilities,
        companion_id: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn family_detection_prefers_architecture_over_filename_when_both_present() {
        assert_eq!(family_from_architecture("qwen2", "model.gguf"), ModelFamily::Qwen3);
        assert_eq!(family_from_architecture("", "tinyllama-1.1b-q4_k_m.gguf"), ModelFamily::TinyLlama);
    }

    #[test]
    fn quantization_pattern_matching_picks_the_longest_specific_code() {
        assert_eq!(quantization_from_filename("llama-3-8b-Q4_K_M.gguf"), Some(Quantization::Q4KM));
        assert_eq!(quantization_from_filename("llama-3-8b-F16.gguf"), Some(Quantization::F16));
        assert_eq!(quantization_from_filename("no-hint-here.gguf"), None);
    }

    #[test]
    fn param_count_is_read_from_known_filename_tokens() {
        assert_eq!(params_billions_from_filename("qwen3-1.8b-instruct-q4_k_m.gguf"), Some(1.8));
        assert_eq!(params_billions_from_filename("llama-3-70b-q4_k_m.gguf"), Some(70.0));
        assert_eq!(params_billions_from_filename("unknown-model.gguf"), None);
    }

    #[test]
    fn describing_a_missing_file_reports_model_load_error() {
        let result = describe_gguf_file(
            Path::new("/nonexistent/path/model.gguf"),
            "m",
            None,
            None,
            vec![Capability::Chat],
        );
        assert!(matches!(result, Err(RuntimeError::ModelLoad(ModelLoadError::MissingFile(_)))));
    }
}
