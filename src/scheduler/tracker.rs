//! Bounded latency and battery-drain trackers (spec.md §3 "Scheduler state
//! per workload", §4.3 step 2).
//!
//! No teacher file tracks percentiles or drain rate; the bounded-ring-buffer
//! shape is grounded on the teacher's own `BATCH_CAP` constant pattern in
//! `src/web/chat/generation.rs` (a fixed capacity chosen once, never resized)
//! applied here to a latency sample window instead of a decode batch.

use std::collections::VecDeque;

/// Default per-workload sample window (spec.md §3).
const MAX_SAMPLES: usize = 100;
/// A tracker is "warmed up" — usable for adaptive-budget resolution — once
/// it holds at least this many samples (spec.md §4.3 step 3).
const WARMUP_SAMPLES: usize = 20;
const BATTERY_WINDOW_SECS: i64 = 600;
/// Minimum elapsed time in the battery window before a drain rate is
/// considered meaningful rather than noise (spec.md §4.3 step 2).
const MIN_DRAIN_WINDOW_SECS: f64 = 120.0;

/// Tracks recent latency samples (milliseconds) for one workload, bounded to
/// the most recent `MAX_SAMPLES` observations, and answers p50/p95/p99
/// queries by sorting a snapshot on demand.
#[derive(Debug, Default)]
pub struct LatencyTracker {
    samples: VecDeque<f64>,
}

impl LatencyTracker {
    pub fn new() -> Self {
        Self { samples: VecDeque::with_capacity(MAX_SAMPLES) }
    }

    pub fn record(&mut self, latency_ms: f64) {
        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(latency_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether this tracker holds enough samples to feed adaptive-budget
    /// resolution (spec.md §4.3 step 3).
    pub fn is_warmed_up(&self) -> bool {
        self.samples.len() >= WARMUP_SAMPLES
    }

    fn percentile(&self, p: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
        Some(sorted[rank.min(sorted.len() - 1)])
    }

    pub fn p50(&self) -> Option<f64> {
        self.percentile(50.0)
    }

    pub fn p95(&self) -> Option<f64> {
        self.percentile(95.0)
    }

    pub fn p99(&self) -> Option<f64> {
        self.percentile(99.0)
    }
}

/// Tracks battery percentage samples over a rolling 10-minute window and
/// reports the drain rate in percent-per-10-minutes, the unit spec.md §3's
/// `Budget.battery_drain_percent_per_10min` field is expressed in.
#[derive(Debug, Default)]
pub struct BatteryDrainTracker {
    samples: VecDeque<(i64, f32)>, // (epoch_ms, battery_percent)
}

impl BatteryDrainTracker {
    pub fn new() -> Self {
        Self { samples: VecDeque::new() }
    }

    pub fn record(&mut self, now_ms: i64, battery_percent: f32) {
        self.samples.push_back((now_ms, battery_percent));
        let cutoff = now_ms - BATTERY_WINDOW_SECS * 1000;
        while let Some(&(ts, _)) = self.samples.front() {
            if ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Percent-per-10-minute drain rate over the current window. `None`
    /// until at least two samples span at least 120s (spec.md §4.3 step 2
    /// "requires ≥2 samples and ≥120s of data").
    pub fn drain_rate_percent_per_10min(&self) -> Option<f32> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;
        let elapsed_secs = (last.0 - first.0) as f64 / 1000.0;
        if self.samples.len() < 2 || elapsed_secs < MIN_DRAIN_WINDOW_SECS {
            return None;
        }
        let dropped = (first.1 - last.1) as f64;
        let rate_per_sec = dropped / elapsed_secs;
        Some((rate_per_sec * 600.0) as f32)
    }
}
