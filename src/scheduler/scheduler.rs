//! The Scheduler (spec.md §4.3): ties telemetry, per-workload latency
//! tracking, budget resolution, and degrade/restore decisions into one tick.
//!
//! Grounded on the teacher's single-writer `Logger` (`src/web/logger.rs`,
//! `Mutex<HashMap<String, File>>` keyed by conversation id): one registry
//! keyed by workload id, guarded by one lock, exactly the same shape applied
//! here to per-workload `LatencyTracker`s and QoS levels instead of log file
//! handles. Trace emission on each tick reuses the teacher's `trace_record!`
//! sink (`src/logging.rs`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::logging::Stage;
use crate::types::{DeviceProfile, TelemetrySource};

use super::budget::Budget;
use super::qos::{knobs_for, QosKnobs, QosLevel};
use super::tracker::{BatteryDrainTracker, LatencyTracker};

/// Per-workload priority. `Ord` is declared ascending by importance, so
/// `min`/`max` over `(priority, sequence)` directly implement spec.md §4.3's
/// tie-break rules: the lowest-priority, first-registered workload degrades
/// first; the highest-priority, last-registered workload restores first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Which budget constraint a `Violation` reports against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    Latency,
    Thermal,
    Battery,
    Memory,
}

/// Whether a violated constraint can be mitigated by degrading a workload.
/// Memory pressure is handled by the eviction-callback scan instead, so it
/// is always observe-only from the degrade/restore algorithm's perspective
/// (spec.md §4.3 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    Actionable,
    ObserveOnly,
}

/// One budget breach recorded on the violations stream (spec.md §4.3 step
/// 8). `workload_id` is `None` for device-global constraints (thermal,
/// battery, memory); latency violations are attributed to the workload with
/// the worst p95.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub workload_id: Option<String>,
    pub constraint: Constraint,
    pub current_value: f64,
    pub budget_value: f64,
    pub kind: ViolationKind,
    pub note: String,
}

/// Minimum time a workload must hold its current level before it's eligible
/// for restoration (spec.md §4.3 step 7). Decoupled from `RuntimePolicy`'s
/// own cooldown constant: the two are separate mechanisms.
const RESTORE_COOLDOWN_MS: i64 = 30_000;
/// RSS must exceed the resolved memory ceiling by this factor before the
/// eviction-callback scan runs (spec.md §4.3 step 5).
const MEMORY_EVICTION_TRIGGER_FACTOR: f64 = 1.10;

type EvictionCallback = Box<dyn FnOnce() + Send>;

struct WorkloadState {
    priority: Priority,
    sequence: u64,
    level: QosLevel,
    tracker: LatencyTracker,
    last_transition_ms: i64,
    eviction: Option<EvictionCallback>,
}

struct Inner {
    workloads: HashMap<String, WorkloadState>,
    next_sequence: u64,
    budget: Budget,
    battery: BatteryDrainTracker,
    violations: Vec<Violation>,
}

/// Coordinates adaptive QoS across every registered workload on a device.
/// One `Scheduler` per process; workloads register/unregister as chat,
/// vision, or speech sessions come and go.
pub struct Scheduler {
    telemetry: Arc<dyn TelemetrySource>,
    device: DeviceProfile,
    inner: Mutex<Inner>,
}

impl Scheduler {
    pub fn new(telemetry: Arc<dyn TelemetrySource>, device: DeviceProfile, budget: Budget) -> Self {
        Self {
            telemetry,
            device,
            inner: Mutex::new(Inner {
                workloads: HashMap::new(),
                next_sequence: 0,
                budget,
                battery: BatteryDrainTracker::new(),
                violations: Vec::new(),
            }),
        }
    }

    pub fn set_budget(&self, budget: Budget) {
        self.inner.lock().unwrap().budget = budget;
    }

    pub fn device(&self) -> DeviceProfile {
        self.device
    }

    /// Registers a workload at `priority`, starting at `QosLevel::Full`.
    /// Re-registering an id already present updates its priority in place
    /// and leaves its level, tracker, and registration order untouched.
    pub fn register_workload(&self, id: impl Into<String>, priority: Priority) {
        let mut inner = self.inner.lock().unwrap();
        let id = id.into();
        if let Some(existing) = inner.workloads.get_mut(&id) {
            existing.priority = priority;
            return;
        }
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.workloads.insert(
            id,
            WorkloadState {
                priority,
                sequence,
                level: QosLevel::Full,
                tracker: LatencyTracker::new(),
                last_transition_ms: i64::MIN,
                eviction: None,
            },
        );
    }

    pub fn unregister_workload(&self, id: &str) {
        self.inner.lock().unwrap().workloads.remove(id);
    }

    /// Registers a one-shot callback the memory-pressure scan (spec.md §4.3
    /// step 5) may invoke to free this workload's memory. Consumed at most
    /// once: after it fires, the workload is unregistered.
    pub fn register_memory_eviction(&self, id: &str, callback: impl FnOnce() + Send + 'static) {
        if let Some(workload) = self.inner.lock().unwrap().workloads.get_mut(id) {
            workload.eviction = Some(Box::new(callback));
        }
    }

    pub fn report_latency(&self, id: &str, latency_ms: f64) {
        if let Some(workload) = self.inner.lock().unwrap().workloads.get_mut(id) {
            workload.tracker.record(latency_ms);
        }
    }

    /// The knobs a workload should currently apply, from its own QoS level.
    pub fn knobs_for(&self, id: &str) -> Option<QosKnobs> {
        self.inner.lock().unwrap().workloads.get(id).map(|w| knobs_for(w.level))
    }

    pub fn level_of(&self, id: &str) -> Option<QosLevel> {
        self.inner.lock().unwrap().workloads.get(id).map(|w| w.level)
    }

    /// Drains and returns all violations recorded since the last call.
    pub fn drain_violations(&self) -> Vec<Violation> {
        std::mem::take(&mut self.inner.lock().unwrap().violations)
    }

    /// Runs one scheduling pass (spec.md §4.3 step-by-step):
    /// 1. Sample telemetry.
    /// 2. Feed the battery drain tracker.
    /// 3. Resolve an adaptive budget's thresholds a little further, if any
    ///    new warm-up or drain data is available.
    /// 4. Classify each constraint named by the resolved budget as
    ///    actionable or observe-only.
    /// 5. Handle the observe-only memory constraint: if RSS has exceeded the
    ///    ceiling by 10%, invoke the lowest-priority eviction callback.
    /// 6. Degrade at most one workload, if any constraint is actionable.
    /// 7. Otherwise, restore at most one workload past its cooldown.
    /// 8. Append a `Violation` for every constraint breached this tick.
    /// 9. Emit a trace record of the pass.
    pub fn tick(&self, now_ms: i64) {
        let sample = self.telemetry.sample();
        let mut inner = self.inner.lock().unwrap();

        inner.battery.record(now_ms, sample.battery_percent);

        let worst_warmed_up_p95 = inner
            .workloads
            .values()
            .filter(|w| w.tracker.is_warmed_up())
            .filter_map(|w| w.tracker.p95())
            .fold(None, |acc: Option<f64>, p95| Some(acc.map_or(p95, |a| a.max(p95))));
        let drain_rate = inner.battery.drain_rate_percent_per_10min();
        inner.budget.resolve(worst_warmed_up_p95, sample.rss_bytes, sample.thermal_index, drain_rate);
        let thresholds = inner.budget.thresholds();

        let mut actionable = Vec::new();
        let mut observe_only = Vec::new();

        if let Some(target) = thresholds.p95_latency_ms {
            if let Some((worst_id, worst_p95)) = inner
                .workloads
                .iter()
                .filter(|(_, w)| w.tracker.is_warmed_up())
                .filter_map(|(id, w)| w.tracker.p95().map(|p95| (id.clone(), p95)))
                .fold(None, |acc: Option<(String, f64)>, (id, p95)| match acc {
                    Some((_, best)) if best >= p95 => acc,
                    _ => Some((id, p95)),
                })
            {
                if worst_p95 > target {
                    actionable.push(Violation {
                        workload_id: Some(worst_id),
                        constraint: Constraint::Latency,
                        current_value: worst_p95,
                        budget_value: target,
                        kind: ViolationKind::Actionable,
                        note: "p95 latency exceeded the resolved budget".to_string(),
                    });
                }
            }
        }

        if let Some(max_thermal) = thresholds.max_thermal_index {
            if sample.thermal_index > max_thermal {
                actionable.push(Violation {
                    workload_id: None,
                    constraint: Constraint::Thermal,
                    current_value: sample.thermal_index as f64,
                    budget_value: max_thermal as f64,
                    kind: ViolationKind::Actionable,
                    note: "thermal index exceeded the resolved budget".to_string(),
                });
            }
        }

        if let Some(max_drain) = thresholds.battery_drain_percent_per_10min {
            if let Some(rate) = drain_rate {
                if rate > max_drain {
                    actionable.push(Violation {
                        workload_id: None,
                        constraint: Constraint::Battery,
                        current_value: rate as f64,
                        budget_value: max_drain as f64,
                        kind: ViolationKind::Actionable,
                        note: "battery drain rate exceeded the resolved budget".to_string(),
                    });
                }
            }
        }

        if let Some(ceiling) = thresholds.memory_ceiling_bytes {
            if sample.rss_bytes > ceiling {
                observe_only.push(Violation {
                    workload_id: None,
                    constraint: Constraint::Memory,
                    current_value: sample.rss_bytes as f64,
                    budget_value: ceiling as f64,
                    kind: ViolationKind::ObserveOnly,
                    note: "RSS exceeded the resolved memory ceiling".to_string(),
                });
                if sample.rss_bytes as f64 > ceiling as f64 * MEMORY_EVICTION_TRIGGER_FACTOR {
                    Self::run_eviction_scan(&mut inner);
                }
            }
        }

        if !actionable.is_empty() {
            Self::degrade_one(&mut inner, now_ms);
        } else {
            Self::restore_one(&mut inner, now_ms);
        }

        let actionable_count = actionable.len();
        let observe_only_count = observe_only.len();
        inner.violations.extend(actionable);
        inner.violations.extend(observe_only);

        crate::trace_record!(
            Stage::SchedulerDecision,
            actionable_count as f64,
            serde_json::json!({
                "observe_only_count": observe_only_count,
                "thermal_index": sample.thermal_index,
                "battery_percent": sample.battery_percent,
                "rss_bytes": sample.rss_bytes,
            })
        );
    }

    fn run_eviction_scan(inner: &mut Inner) {
        let candidate = inner
            .workloads
            .iter()
            .filter(|(_, w)| w.eviction.is_some())
            .map(|(id, w)| (w.priority, w.sequence, id.clone()))
            .min();
        if let Some((_, _, id)) = candidate {
            if let Some(workload) = inner.workloads.remove(&id) {
                if let Some(callback) = workload.eviction {
                    callback();
                }
                crate::trace_record!(Stage::MemoryEviction, 1.0, serde_json::json!({ "workload_id": id }));
            }
        }
    }

    fn degrade_one(inner: &mut Inner, now_ms: i64) {
        let candidate = inner
            .workloads
            .iter()
            .filter(|(_, w)| w.level != QosLevel::Paused)
            .map(|(id, w)| (w.priority, w.sequence, id.clone()))
            .min();
        if let Some((_, _, id)) = candidate {
            if let Some(workload) = inner.workloads.get_mut(&id) {
                workload.level = workload.level.step_down();
                workload.last_transition_ms = now_ms;
            }
        }
    }

    fn restore_one(inner: &mut Inner, now_ms: i64) {
        let candidate = inner
            .workloads
            .iter()
            .filter(|(_, w)| w.level != QosLevel::Full && now_ms - w.last_transition_ms >= RESTORE_COOLDOWN_MS)
            .map(|(id, w)| (w.priority, w.sequence, id.clone()))
            .max();
        if let Some((_, _, id)) = candidate {
            if let Some(workload) = inner.workloads.get_mut(&id) {
                workload.level = workload.level.step_up();
                workload.last_transition_ms = now_ms;
            }
        }
    }
}
