//! Energy-based voice activity detection (spec.md §4.6).
//!
//! No teacher file does audio VAD; grounded on spec.md's description of an
//! RMS-threshold detector, the simplest voice-activity signal that needs no
//! model — appropriate for a hot loop that runs on every captured audio
//! frame before any inference is invoked.

/// Root-mean-square energy of a PCM16 frame, normalized to `[0.0, 1.0]`.
pub fn rms_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let mean_square = sum_squares / samples.len() as f64;
    (mean_square.sqrt() / i16::MAX as f64) as f32
}

/// Simple hysteresis-free energy threshold detector. A frame is "speech" if
/// its RMS energy exceeds `threshold`.
#[derive(Debug, Clone, Copy)]
pub struct EnergyVad {
    pub threshold: f32,
}

impl EnergyVad {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn is_speech(&self, samples: &[i16]) -> bool {
        rms_energy(samples) > self.threshold
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(0.03)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_zero_energy() {
        let samples = vec![0i16; 100];
        assert_eq!(rms_energy(&samples), 0.0);
    }

    #[test]
    fn full_scale_tone_has_energy_near_one() {
        let samples = vec![i16::MAX; 100];
        assert!((rms_energy(&samples) - 1.0).abs() < 0.01);
    }

    #[test]
    fn empty_frame_is_not_speech() {
        let vad = EnergyVad::default();
        assert!(!vad.is_speech(&[]));
    }

    #[test]
    fn loud_frame_is_detected_as_speech() {
        let vad = EnergyVad::new(0.1);
        let samples = vec![i16::MAX / 2; 100];
        assert!(vad.is_speech(&samples));
    }

    #[test]
    fn quiet_frame_is_not_speech() {
        let vad = EnergyVad::new(0.5);
        let samples = vec![10i16; 100];
        assert!(!vad.is_speech(&samples));
    }
}
