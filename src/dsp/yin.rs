//! YIN Pitch Estimator
//!
//! Difference-function pitch detection with cumulative-mean normalization,
//! absolute threshold, and parabolic refinement.
//!
//! # Design Notes
//! - Runs on the full-bandwidth (un-decimated) frame; low voices need the resolution
//! - Integration window is half the frame; candidate lags are `[0, N/2)`
//! - Output is either a voiced estimate in `[50, 800]` Hz or `PitchEstimate::UNVOICED`
//! - Scratch is sized at construction; `estimate` never allocates for frames up
//!   to that size

use crate::PitchEstimate;

use super::utils::DB_EPS;

// =============================================================================
// Constants
// =============================================================================

pub const DEFAULT_YIN_THRESHOLD: f32 = 0.15;

/// Physiological gate for the voices this engine targets.
pub const MIN_PITCH_HZ: f32 = 50.0;
pub const MAX_PITCH_HZ: f32 = 800.0;

/// First lag examined by the threshold scan.
const FIRST_LAG: usize = 2;

// =============================================================================
// Estimator
// =============================================================================

pub struct YinEstimator {
    threshold: f32,
    yin: Vec<f32>,
}

impl YinEstimator {
    pub fn new(frame_size: usize, threshold: f32) -> Self {
        Self {
            threshold: threshold.clamp(0.01, 0.99),
            yin: Vec::with_capacity(frame_size / 2),
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn estimate(&mut self, frame: &[f32], sample_rate: f32) -> PitchEstimate {
        let half = frame.len() / 2;
        if half <= FIRST_LAG + 1 || !(sample_rate > 0.0) {
            return PitchEstimate::UNVOICED;
        }

        self.difference(frame, half);
        self.cumulative_mean_normalize();

        let tau = match self.first_dip_below_threshold() {
            Some(tau) => tau,
            None => return PitchEstimate::UNVOICED,
        };

        let refined = self.parabolic_refine(tau);
        let pitch = sample_rate / refined;
        if !pitch.is_finite() || !(MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&pitch) {
            return PitchEstimate::UNVOICED;
        }

        PitchEstimate {
            hz: pitch,
            confidence: (1.0 - self.yin[tau]).clamp(0.0, 1.0),
        }
    }

    /// d(tau) = sum_{i < N/2} (x[i] - x[i + tau])^2
    fn difference(&mut self, x: &[f32], half: usize) {
        self.yin.clear();
        self.yin.resize(half, 0.0);
        for tau in 0..half {
            let mut sum = 0.0f32;
            for i in 0..half {
                let delta = x[i] - x[i + tau];
                sum += delta * delta;
            }
            self.yin[tau] = sum;
        }
    }

    /// d'(tau) = d(tau) * tau / sum_{k=1..tau} d(k), with d'(0) = 1.
    fn cumulative_mean_normalize(&mut self) {
        self.yin[0] = 1.0;
        let mut running = 0.0f32;
        for tau in 1..self.yin.len() {
            running += self.yin[tau];
            self.yin[tau] = if running > DB_EPS {
                self.yin[tau] * tau as f32 / running
            } else {
                1.0
            };
        }
    }

    /// First lag under the threshold, walked down to the bottom of its dip.
    fn first_dip_below_threshold(&self) -> Option<usize> {
        let n = self.yin.len();
        let mut tau = FIRST_LAG;
        while tau < n {
            if self.yin[tau] < self.threshold {
                while tau + 1 < n && self.yin[tau + 1] < self.yin[tau] {
                    tau += 1;
                }
                return Some(tau);
            }
            tau += 1;
        }
        None
    }

    fn parabolic_refine(&self, tau: usize) -> f32 {
        if tau == 0 || tau + 1 >= self.yin.len() {
            return tau as f32;
        }
        let s0 = self.yin[tau - 1];
        let s1 = self.yin[tau];
        let s2 = self.yin[tau + 1];
        let denom = 2.0 * (2.0 * s1 - s2 - s0);
        if denom.abs() < DB_EPS {
            return tau as f32;
        }
        let shift = ((s2 - s0) / denom).clamp(-1.0, 1.0);
        tau as f32 + shift
    }
}
