//! Loudness smoothing.
//!
//! Loudness is the mean rectified amplitude of a window, scaled by the configured sensitivity
//! and run through a single-pole low-pass filter:
//!
//! ```text
//! loudness_t = mean(|x|) * sensitivity * (1 - w) + loudness_(t-1) * w
//! ```
//!
//! `w` is the influence of the previous value. Higher `w` suppresses short spikes and trades
//! responsiveness for stability.

/// Mean of the absolute sample values. `0.0` for an empty window.
pub fn mean_rectified(window: &[f32]) -> f32 {
    if window.is_empty() {
        return 0.0;
    }
    let sum: f32 = window.iter().map(|s| s.abs()).sum();
    sum / window.len() as f32
}

/// Single-pole smoother holding the current and previous loudness.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoudnessFilter {
    sensitivity: f32,
    weight: f32,
    current: f32,
    previous: f32,
}

impl LoudnessFilter {
    /// `weight` is expected to have been validated into `[0, 0.95]` already.
    pub fn new(sensitivity: f32, weight: f32) -> Self {
        Self {
            sensitivity,
            weight,
            current: 0.0,
            previous: 0.0,
        }
    }

    /// Fold one window into the smoothed value and return the new loudness.
    pub fn update(&mut self, window: &[f32]) -> f32 {
        let raw = mean_rectified(window) * self.sensitivity;
        self.previous = self.current;
        self.current = raw * (1.0 - self.weight) + self.previous * self.weight;
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn previous(&self) -> f32 {
        self.previous
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
        self.previous = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_rectified_ignores_sign() {
        assert_eq!(mean_rectified(&[0.5, -0.5, 0.25, -0.25]), 0.375);
        assert_eq!(mean_rectified(&[]), 0.0);
    }

    #[test]
    fn zero_weight_tracks_input_exactly() {
        let mut f = LoudnessFilter::new(100.0, 0.0);
        assert!((f.update(&[0.05; 256]) - 5.0).abs() < 1e-4);
        assert!((f.update(&[0.2; 256]) - 20.0).abs() < 1e-4);
        assert!((f.previous() - 5.0).abs() < 1e-4);
    }

    #[test]
    fn half_weight_blends_previous_value() {
        let mut f = LoudnessFilter::new(10.0, 0.5);
        // raw = 10 -> 10 * 0.5 + 0 * 0.5
        assert_eq!(f.update(&[1.0; 4]), 5.0);
        // raw = 10 -> 10 * 0.5 + 5 * 0.5
        assert_eq!(f.update(&[1.0; 4]), 7.5);
    }

    #[test]
    fn silence_decays_monotonically_toward_zero() {
        let mut f = LoudnessFilter::new(100.0, 0.8);
        for _ in 0..20 {
            f.update(&[0.5; 8]);
        }

        let mut last = f.current();
        for _ in 0..100 {
            let next = f.update(&[0.0; 8]);
            assert!(next <= last);
            assert!(next >= 0.0);
            last = next;
        }
        assert!(last < 1e-3);
    }

    #[test]
    fn reset_clears_history() {
        let mut f = LoudnessFilter::new(100.0, 0.5);
        f.update(&[0.3; 8]);
        f.reset();
        assert_eq!(f.current(), 0.0);
        assert_eq!(f.previous(), 0.0);
    }
}
