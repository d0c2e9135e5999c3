//! Ambient logging and the structured `PerfTrace` sink (spec.md §6).
//!
//! Grounded on `src/web/logger.rs` of the teacher crate: a `lazy_static`
//! process-wide sink reached through macros. The teacher's sink is a
//! per-conversation text file; this crate keeps the "lazily-initialized
//! global, reached via macros" shape but generalizes the payload from free
//! text to the JSONL trace record spec.md §6 defines, and leaves leveled
//! operational logging to the `log`/`log4rs` facade the teacher already
//! depends on.

use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// One line of the JSONL trace file (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub frame_id: u64,
    pub ts_ms: i64,
    pub stage: Stage,
    pub value: f64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Open set of trace stages. Unrecognized stage names from older/newer
/// producers round-trip through `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    BudgetCheck,
    BudgetViolation,
    BudgetResolved,
    SchedulerDecision,
    MemoryEviction,
    ToolDegradation,
    ImageEncode,
    PromptEval,
    Decode,
    TotalInference,
    Other(String),
}

impl Stage {
    fn as_str(&self) -> &str {
        match self {
            Self::BudgetCheck => "budget_check",
            Self::BudgetViolation => "budget_violation",
            Self::BudgetResolved => "budget_resolved",
            Self::SchedulerDecision => "scheduler_decision",
            Self::MemoryEviction => "memory_eviction",
            Self::ToolDegradation => "tool_degradation",
            Self::ImageEncode => "image_encode",
            Self::PromptEval => "prompt_eval",
            Self::Decode => "decode",
            Self::TotalInference => "total_inference",
            Self::Other(s) => s,
        }
    }
}

impl Serialize for Stage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Stage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(match s.as_str() {
            "budget_check" => Self::BudgetCheck,
            "budget_violation" => Self::BudgetViolation,
            "budget_resolved" => Self::BudgetResolved,
            "scheduler_decision" => Self::SchedulerDecision,
            "memory_eviction" => Self::MemoryEviction,
            "tool_degradation" => Self::ToolDegradation,
            "image_encode" => Self::ImageEncode,
            "prompt_eval" => Self::PromptEval,
            "decode" => Self::Decode,
            "total_inference" => Self::TotalInference,
            other => Self::Other(other.to_string()),
        })
    }
}

/// Sink that appends `TraceRecord`s as JSON Lines to a file.
pub struct PerfTrace {
    file: Mutex<Option<std::fs::File>>,
    next_frame_id: Mutex<u64>,
}

impl PerfTrace {
    const fn new() -> Self {
        Self {
            file: Mutex::new(None),
            next_frame_id: Mutex::new(0),
        }
    }

    /// Direct the trace sink at a file, truncating any previous configuration.
    /// Idempotent: calling this again simply repoints the sink.
    pub fn configure(&self, path: &str) -> std::io::Result<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        *self.file.lock().unwrap() = Some(file);
        Ok(())
    }

    /// Allocate the next monotonic frame id, for producers that want to
    /// correlate several trace lines to one logical operation.
    pub fn next_frame_id(&self) -> u64 {
        let mut guard = self.next_frame_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        id
    }

    /// Emit one trace record. A misconfigured (unopened) sink silently drops
    /// the record — tracing must never be able to fail a caller's operation.
    pub fn emit(&self, frame_id: u64, stage: Stage, value: f64, extra: serde_json::Value) {
        let record = TraceRecord {
            frame_id,
            ts_ms: epoch_ms(),
            stage,
            value,
            extra: match extra {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
        };
        if let Ok(line) = serde_json::to_string(&record) {
            if let Ok(mut guard) = self.file.lock() {
                if let Some(file) = guard.as_mut() {
                    let _ = writeln!(file, "{line}");
                    let _ = file.flush();
                }
            }
        }
    }
}

fn epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

lazy_static::lazy_static! {
    /// Global trace sink. Unconfigured by default (records are dropped until
    /// `TRACE.configure(path)` is called by the host application).
    pub static ref TRACE: PerfTrace = PerfTrace::new();
}

/// Emit a trace record without tracking a caller-supplied frame id.
#[macro_export]
macro_rules! trace_record {
    ($stage:expr, $value:expr) => {
        $crate::logging::TRACE.emit(
            $crate::logging::TRACE.next_frame_id(),
            $stage,
            $value,
            serde_json::json!({}),
        );
    };
    ($stage:expr, $value:expr, $extra:expr) => {
        $crate::logging::TRACE.emit($crate::logging::TRACE.next_frame_id(), $stage, $value, $extra);
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_sink_does_not_panic() {
        // A fresh sink (not the global) with no file configured must be a no-op.
        let sink = PerfTrace::new();
        sink.emit(0, Stage::BudgetCheck, 1.0, serde_json::json!({"k": "v"}));
    }

    #[test]
    fn configured_sink_writes_jsonl() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("edge-veda-trace-test-{}.jsonl", std::process::id()));
        let path_str = path.to_str().unwrap().to_string();

        let sink = PerfTrace::new();
        sink.configure(&path_str).unwrap();
        sink.emit(7, Stage::Decode, 12.5, serde_json::json!({"workload": "text"}));

        let content = std::fs::read_to_string(&path_str).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed["frame_id"], 7);
        assert_eq!(parsed["stage"], "decode");
        assert_eq!(parsed["workload"], "text");

        let _ = std::fs::remove_file(&path_str);
    }
}
