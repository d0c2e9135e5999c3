//! End-to-end scheduler behavior: a static thermal budget degrades a
//! workload on the next tick, an adaptive latency budget only starts
//! enforcing once a workload warms up, and a memory ceiling breach runs the
//! priority-ordered eviction scan instead of touching QoS levels.

use std::sync::{Arc, Mutex};

use edge_veda_runtime::scheduler::{
    AdaptiveProfile, Budget, Constraint, Priority, QosLevel, Scheduler, StaticBudget, ViolationKind,
};
use edge_veda_runtime::types::{DeviceProfile, TelemetrySample, TelemetrySource};

struct FixedTelemetry(Mutex<TelemetrySample>);

impl TelemetrySource for FixedTelemetry {
    fn sample(&self) -> TelemetrySample {
        *self.0.lock().unwrap()
    }
}

fn nominal() -> TelemetrySample {
    TelemetrySample { thermal_index: 0, battery_percent: 90.0, rss_bytes: 0, available_memory_bytes: 0, low_power: false }
}

fn device() -> DeviceProfile {
    DeviceProfile { total_ram_bytes: 6_000_000_000, chip_multiplier: 1.0, has_gpu: false }
}

#[test]
fn thermal_spike_degrades_the_only_workload_on_the_next_tick() {
    let mut hot = nominal();
    hot.thermal_index = 3;
    let telemetry = Arc::new(FixedTelemetry(Mutex::new(hot)));
    let budget = Budget::Static(StaticBudget { max_thermal_index: Some(1), ..Default::default() });
    let scheduler = Scheduler::new(telemetry, device(), budget);
    scheduler.register_workload("chat-1", Priority::Medium);

    scheduler.tick(0);

    assert_eq!(scheduler.level_of("chat-1"), Some(QosLevel::Reduced));
}

#[test]
fn an_adaptive_latency_budget_only_enforces_once_the_workload_warms_up() {
    let telemetry = Arc::new(FixedTelemetry(Mutex::new(nominal())));
    let budget = Budget::adaptive(AdaptiveProfile::Conservative);
    let scheduler = Scheduler::new(telemetry, device(), budget);
    scheduler.register_workload("chat-1", Priority::Medium);

    // Warm-up latencies are low; a later spike should read as a violation
    // against the resolved (low) threshold, not get absorbed into warm-up.
    for _ in 0..20 {
        scheduler.report_latency("chat-1", 10.0);
    }
    scheduler.tick(0);
    assert!(scheduler.drain_violations().is_empty());
    assert_eq!(scheduler.level_of("chat-1"), Some(QosLevel::Full));

    for _ in 0..20 {
        scheduler.report_latency("chat-1", 900.0);
    }
    scheduler.tick(1);

    let violations = scheduler.drain_violations();
    assert!(violations.iter().any(|v| v.constraint == Constraint::Latency && v.workload_id.as_deref() == Some("chat-1")));
    assert_eq!(scheduler.level_of("chat-1"), Some(QosLevel::Reduced));
}

#[test]
fn a_memory_ceiling_breach_evicts_instead_of_degrading_qos() {
    let mut tight = nominal();
    tight.rss_bytes = 1_000;
    let telemetry = Arc::new(FixedTelemetry(Mutex::new(tight)));
    let budget = Budget::Static(StaticBudget { memory_ceiling_bytes: Some(500), ..Default::default() });
    let scheduler = Scheduler::new(telemetry, device(), budget);
    scheduler.register_workload("vision-1", Priority::Low);

    let evicted = Arc::new(Mutex::new(false));
    let flag = evicted.clone();
    scheduler.register_memory_eviction("vision-1", move || *flag.lock().unwrap() = true);

    scheduler.tick(0);

    assert!(*evicted.lock().unwrap());
    assert_eq!(scheduler.level_of("vision-1"), None);
    let violations = scheduler.drain_violations();
    assert!(violations.iter().any(|v| v.constraint == Constraint::Memory && v.kind == ViolationKind::ObserveOnly));
}
