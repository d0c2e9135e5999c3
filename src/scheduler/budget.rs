//! Scheduler budget types: static constraints, or an adaptive profile that
//! resolves to concrete thresholds once warm-up telemetry is available
//! (spec.md §3 "Budget", §4.3 step 3).
//!
//! Grounded on this module's own prior shape (a `resolve` function deriving
//! a concrete allowance from a `DeviceProfile` and the latest sample),
//! generalized from a single memory/thread pair to the four independent
//! constraint kinds spec.md names, plus the adaptive/static distinction.

use crate::types::ThermalIndex;

/// A concrete set of enforcement thresholds. Every field is optional: a
/// caller only constrains what it cares about (spec.md §3: "any subset of
/// {p95 latency ms, battery drain percent per ten minutes, memory ceiling
/// MiB, max thermal index}").
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StaticBudget {
    pub p95_latency_ms: Option<f64>,
    pub battery_drain_percent_per_10min: Option<f32>,
    pub memory_ceiling_bytes: Option<u64>,
    pub max_thermal_index: Option<ThermalIndex>,
}

/// How much headroom an adaptive budget's resolved thresholds leave above
/// the measured warm-up baseline. Conservative profiles enforce close to
/// what was actually observed; aggressive profiles leave a wide margin and
/// only flag a severe regression from warm-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveProfile {
    Conservative,
    Balanced,
    Aggressive,
}

impl AdaptiveProfile {
    fn headroom(self) -> f64 {
        match self {
            Self::Conservative => 0.10,
            Self::Balanced => 0.25,
            Self::Aggressive => 0.50,
        }
    }
}

/// A scheduler budget: either a fixed set of thresholds, or a profile that
/// resolves to one once enough telemetry has accumulated. Resolution is
/// two-phase (spec.md §4.3 step 3): the latency/thermal/memory thresholds
/// resolve together once a workload's latency tracker warms up, while the
/// battery threshold resolves independently once the drain tracker has its
/// own 120s of data — one may lag the other by several ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Budget {
    Static(StaticBudget),
    Adaptive { profile: AdaptiveProfile, resolved: StaticBudget },
}

impl Budget {
    pub fn adaptive(profile: AdaptiveProfile) -> Self {
        Self::Adaptive { profile, resolved: StaticBudget::default() }
    }

    /// The thresholds currently in force. For an unresolved adaptive budget
    /// this starts out empty, so no constraint is enforceable yet.
    pub fn thresholds(&self) -> StaticBudget {
        match self {
            Self::Static(budget) => *budget,
            Self::Adaptive { resolved, .. } => *resolved,
        }
    }

    /// Fills in whichever adaptive thresholds can be resolved from what's
    /// available right now. Fields already resolved are left untouched;
    /// fields with no data yet stay `None` until a later call supplies it.
    /// A no-op on a static budget.
    pub fn resolve(
        &mut self,
        warmed_up_worst_p95_ms: Option<f64>,
        rss_bytes: u64,
        thermal_index: ThermalIndex,
        drain_percent_per_10min: Option<f32>,
    ) {
        let Self::Adaptive { profile, resolved } = self else { return };
        let headroom = profile.headroom();
        if let Some(p95) = warmed_up_worst_p95_ms {
            if resolved.p95_latency_ms.is_none() {
                resolved.p95_latency_ms = Some(p95 * (1.0 + headroom));
            }
            if resolved.memory_ceiling_bytes.is_none() {
                resolved.memory_ceiling_bytes = Some((rss_bytes as f64 * (1.0 + headroom)) as u64);
            }
            if resolved.max_thermal_index.is_none() {
                resolved.max_thermal_index = Some(thermal_index);
            }
        }
        if resolved.battery_drain_percent_per_10min.is_none() {
            resolved.battery_drain_percent_per_10min =
                drain_percent_per_10min.map(|drain| drain * (1.0 + headroom as f32));
        }
    }
}
