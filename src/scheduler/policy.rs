//! Priority-band device policy: a standalone QoS decision for hosts that
//! want a single device-wide level without registering workloads with a
//! full `Scheduler` (spec.md §4.3 "RuntimePolicy").
//!
//! Grounded on this module's own prior shape (a state machine that only
//! transitions through one owning call site, `RuntimePolicy::evaluate`,
//! never by direct field mutation) — the same single-entry-point discipline
//! the teacher applies to its native handle lifecycle — generalized from a
//! streak-based hysteresis to spec.md's priority-band model: any pressure
//! escalates immediately, recovery is throttled to one level per cooldown.

use crate::types::{TelemetrySample, ThermalIndex};

use super::qos::QosLevel;

/// Minimum time between successive restoration steps (spec.md §4.3: "single
/// level per 30s cooldown" — three cooldowns to fully restore from paused).
pub const RESTORE_COOLDOWN_MS: i64 = 30_000;

const THERMAL_CRITICAL: ThermalIndex = 3;
const THERMAL_SERIOUS: ThermalIndex = 2;
const THERMAL_MODERATE: ThermalIndex = 1;

const CRITICAL_AVAIL_MEM_BYTES: u64 = 50 * 1024 * 1024;
const SERIOUS_AVAIL_MEM_BYTES: u64 = 100 * 1024 * 1024;
/// Default "moderate" available-memory floor; overridable per spec.md §4.3's
/// "configured minimum (default 200 MiB)".
pub const DEFAULT_MODERATE_AVAIL_MEM_BYTES: u64 = 200 * 1024 * 1024;

const SERIOUS_BATTERY_PERCENT: f32 = 5.0;
const MODERATE_BATTERY_PERCENT: f32 = 15.0;

/// Priority-band policy mapping telemetry to a `QosLevel`: `critical` →
/// paused, `serious` → minimal, `moderate` → reduced, otherwise full
/// (spec.md §4.3). Escalation to a more restrictive band is immediate and
/// can jump more than one level in a single call; recovery toward `Full`
/// steps down one level at a time, gated by `RESTORE_COOLDOWN_MS`.
#[derive(Debug)]
pub struct RuntimePolicy {
    level: QosLevel,
    moderate_avail_mem_bytes: u64,
    last_transition_ms: i64,
}

impl RuntimePolicy {
    pub fn new() -> Self {
        Self {
            level: QosLevel::Full,
            moderate_avail_mem_bytes: DEFAULT_MODERATE_AVAIL_MEM_BYTES,
            last_transition_ms: i64::MIN,
        }
    }

    /// Overrides the "moderate" available-memory floor from its 200 MiB
    /// default.
    pub fn with_moderate_avail_mem_bytes(mut self, bytes: u64) -> Self {
        self.moderate_avail_mem_bytes = bytes;
        self
    }

    pub fn current_level(&self) -> QosLevel {
        self.level
    }

    /// Feeds one tick's telemetry and returns the (possibly unchanged)
    /// resulting level.
    pub fn evaluate(&mut self, now_ms: i64, sample: &TelemetrySample) -> QosLevel {
        let wanted = Self::band_level(sample, self.moderate_avail_mem_bytes);

        if wanted > self.level {
            self.level = wanted;
            self.last_transition_ms = now_ms;
        } else if wanted < self.level && now_ms - self.last_transition_ms >= RESTORE_COOLDOWN_MS {
            self.level = self.level.step_up();
            self.last_transition_ms = now_ms;
        }

        self.level
    }

    /// Evaluates the band a sample falls into directly, with no hysteresis
    /// and no side effects. Used by callers that want "what level would this
    /// device run at right now" without a running policy's history.
    pub fn evaluate_once(sample: &TelemetrySample) -> QosLevel {
        Self::band_level(sample, DEFAULT_MODERATE_AVAIL_MEM_BYTES)
    }

    fn band_level(sample: &TelemetrySample, moderate_avail_mem_bytes: u64) -> QosLevel {
        if sample.thermal_index >= THERMAL_CRITICAL || sample.available_memory_bytes < CRITICAL_AVAIL_MEM_BYTES {
            return QosLevel::Paused;
        }
        if sample.thermal_index >= THERMAL_SERIOUS
            || sample.available_memory_bytes < SERIOUS_AVAIL_MEM_BYTES
            || sample.battery_percent < SERIOUS_BATTERY_PERCENT
        {
            return QosLevel::Minimal;
        }
        if sample.thermal_index >= THERMAL_MODERATE
            || sample.available_memory_bytes < moderate_avail_mem_bytes
            || sample.battery_percent < MODERATE_BATTERY_PERCENT
            || sample.low_power
        {
            return QosLevel::Reduced;
        }
        QosLevel::Full
    }
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nominal_sample() -> TelemetrySample {
        TelemetrySample {
            thermal_index: 0,
            battery_percent: 80.0,
            rss_bytes: 0,
            available_memory_bytes: 1_000_000_000,
            low_power: false,
        }
    }

    #[test]
    fn stays_at_full_under_nominal_conditions() {
        let mut policy = RuntimePolicy::new();
        for t in 0..10 {
            assert_eq!(policy.evaluate(t * 1_000, &nominal_sample()), QosLevel::Full);
        }
    }

    #[test]
    fn critical_thermal_drops_immediately_to_paused() {
        let mut policy = RuntimePolicy::new();
        let mut sample = nominal_sample();
        sample.thermal_index = 3;
        assert_eq!(policy.evaluate(0, &sample), QosLevel::Paused);
    }

    #[test]
    fn critical_available_memory_also_drops_immediately_to_paused() {
        let mut policy = RuntimePolicy::new();
        let mut sample = nominal_sample();
        sample.available_memory_bytes = 10 * 1024 * 1024;
        assert_eq!(policy.evaluate(0, &sample), QosLevel::Paused);
    }

    #[test]
    fn serious_battery_drops_to_minimal() {
        let mut policy = RuntimePolicy::new();
        let mut sample = nominal_sample();
        sample.battery_percent = 3.0;
        assert_eq!(policy.evaluate(0, &sample), QosLevel::Minimal);
    }

    #[test]
    fn moderate_low_power_drops_to_reduced() {
        let mut policy = RuntimePolicy::new();
        let mut sample = nominal_sample();
        sample.low_power = true;
        assert_eq!(policy.evaluate(0, &sample), QosLevel::Reduced);
    }

    #[test]
    fn escalation_from_full_can_jump_straight_to_paused() {
        let mut policy = RuntimePolicy::new();
        let mut sample = nominal_sample();
        sample.thermal_index = 3;
        policy.evaluate(0, &sample);
        assert_eq!(policy.current_level(), QosLevel::Paused);
    }

    #[test]
    fn restoration_is_throttled_to_one_level_per_cooldown() {
        let mut policy = RuntimePolicy::new();
        let mut hot = nominal_sample();
        hot.thermal_index = 3;
        policy.evaluate(0, &hot);
        assert_eq!(policy.current_level(), QosLevel::Paused);

        // Pressure clears, but the cooldown hasn't elapsed yet.
        assert_eq!(policy.evaluate(1_000, &nominal_sample()), QosLevel::Paused);
        assert_eq!(policy.evaluate(RESTORE_COOLDOWN_MS - 1, &nominal_sample()), QosLevel::Paused);
        // One cooldown later, exactly one level is restored.
        assert_eq!(policy.evaluate(RESTORE_COOLDOWN_MS, &nominal_sample()), QosLevel::Minimal);
    }

    #[test]
    fn fully_restoring_from_paused_takes_three_cooldowns() {
        let mut policy = RuntimePolicy::new();
        let mut hot = nominal_sample();
        hot.thermal_index = 3;
        policy.evaluate(0, &hot);

        let mut now = 0;
        for expected in [QosLevel::Minimal, QosLevel::Reduced, QosLevel::Full] {
            now += RESTORE_COOLDOWN_MS;
            assert_eq!(policy.evaluate(now, &nominal_sample()), expected);
        }
    }

    #[test]
    fn evaluate_once_has_no_side_effects_on_a_running_policy() {
        let mut hot = nominal_sample();
        hot.thermal_index = 3;
        assert_eq!(RuntimePolicy::evaluate_once(&hot), QosLevel::Paused);
        assert_eq!(RuntimePolicy::evaluate_once(&nominal_sample()), QosLevel::Full);
    }
}
