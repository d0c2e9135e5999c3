//! QoS levels and workload knobs (spec.md §3 "QoS knob set", §4.3).
//!
//! Grounded on this module's own prior shape (an ordered level enum plus a
//! knobs-for-level lookup) generalized to the level names and knob set
//! spec.md actually names: `full`/`reduced`/`minimal`/`paused`, with knobs
//! over vision/decode work rather than thread counts.

/// Degradation level applied to a workload, from least to most restrictive.
/// `Ord` follows declaration order, so `Paused` is the highest level
/// (spec.md §4.3 "full → reduced → minimal → paused").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QosLevel {
    Full,
    Reduced,
    Minimal,
    Paused,
}

impl QosLevel {
    /// One step toward `Paused`, or `self` if already there.
    pub fn step_down(self) -> Self {
        match self {
            Self::Full => Self::Reduced,
            Self::Reduced => Self::Minimal,
            Self::Minimal | Self::Paused => Self::Paused,
        }
    }

    /// One step toward `Full`, or `self` if already there.
    pub fn step_up(self) -> Self {
        match self {
            Self::Paused => Self::Minimal,
            Self::Minimal => Self::Reduced,
            Self::Reduced | Self::Full => Self::Full,
        }
    }
}

/// The knobs a workload reads back from the scheduler to shape its own work
/// (spec.md §3 "QoS knob set"): camera sampling rate, the short side of any
/// image fed to a vision model, and how many tokens a turn is allowed to
/// decode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QosKnobs {
    pub max_fps: u32,
    pub image_short_side_px: u32,
    pub max_decode_tokens: u32,
}

/// Exact per-level defaults from spec.md §3.
pub fn knobs_for(level: QosLevel) -> QosKnobs {
    match level {
        QosLevel::Full => QosKnobs { max_fps: 2, image_short_side_px: 640, max_decode_tokens: 100 },
        QosLevel::Reduced => QosKnobs { max_fps: 1, image_short_side_px: 480, max_decode_tokens: 75 },
        QosLevel::Minimal => QosKnobs { max_fps: 1, image_short_side_px: 320, max_decode_tokens: 50 },
        QosLevel::Paused => QosKnobs { max_fps: 0, image_short_side_px: 0, max_decode_tokens: 0 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_order_from_full_to_paused() {
        assert!(QosLevel::Full < QosLevel::Reduced);
        assert!(QosLevel::Reduced < QosLevel::Minimal);
        assert!(QosLevel::Minimal < QosLevel::Paused);
    }

    #[test]
    fn step_down_walks_one_level_at_a_time_and_floors_at_paused() {
        assert_eq!(QosLevel::Full.step_down(), QosLevel::Reduced);
        assert_eq!(QosLevel::Reduced.step_down(), QosLevel::Minimal);
        assert_eq!(QosLevel::Minimal.step_down(), QosLevel::Paused);
        assert_eq!(QosLevel::Paused.step_down(), QosLevel::Paused);
    }

    #[test]
    fn step_up_walks_one_level_at_a_time_and_ceils_at_full() {
        assert_eq!(QosLevel::Paused.step_up(), QosLevel::Minimal);
        assert_eq!(QosLevel::Minimal.step_up(), QosLevel::Reduced);
        assert_eq!(QosLevel::Reduced.step_up(), QosLevel::Full);
        assert_eq!(QosLevel::Full.step_up(), QosLevel::Full);
    }

    #[test]
    fn paused_knobs_are_all_zero() {
        let knobs = knobs_for(QosLevel::Paused);
        assert_eq!(knobs.max_fps, 0);
        assert_eq!(knobs.image_short_side_px, 0);
        assert_eq!(knobs.max_decode_tokens, 0);
    }

    #[test]
    fn full_knobs_match_spec_defaults() {
        let knobs = knobs_for(QosLevel::Full);
        assert_eq!(knobs.max_fps, 2);
        assert_eq!(knobs.image_short_side_px, 640);
        assert_eq!(knobs.max_decode_tokens, 100);
    }

    #[test]
    fn each_step_down_tightens_every_knob() {
        let full = knobs_for(QosLevel::Full);
        let reduced = knobs_for(QosLevel::Reduced);
        let minimal = knobs_for(QosLevel::Minimal);
        assert!(reduced.max_decode_tokens < full.max_decode_tokens);
        assert!(minimal.max_decode_tokens < reduced.max_decode_tokens);
        assert!(reduced.image_short_side_px < full.image_short_side_px);
        assert!(minimal.image_short_side_px < reduced.image_short_side_px);
    }
}
