//! Alternate pitch predictors.
//!
//! The engine's primary pitch path is YIN. A host may substitute another
//! predictor (e.g. an ML model it loads itself) behind `PitchPredictor`; any
//! `Err` it returns is absorbed by the engine, which falls back to YIN for
//! that frame.

use std::fmt;

use crate::PitchEstimate;

use super::yin::{MAX_PITCH_HZ, MIN_PITCH_HZ};

#[derive(Debug, Clone, PartialEq)]
pub enum PredictorError {
    /// The backend is not loaded or cannot run on this host.
    Unavailable(String),
    InferenceFailed(String),
}

impl fmt::Display for PredictorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictorError::Unavailable(msg) => write!(f, "pitch predictor unavailable: {}", msg),
            PredictorError::InferenceFailed(msg) => {
                write!(f, "pitch predictor inference failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for PredictorError {}

/// `{pitch, confidence}` contract shared by every pitch source.
pub trait PitchPredictor: Send {
    fn name(&self) -> &str;

    /// Estimate for one full-bandwidth frame. Must return either a voiced value
    /// inside `[50, 800]` Hz or `PitchEstimate::UNVOICED`.
    fn predict(&mut self, frame: &[f32], sample_rate: f32) -> Result<PitchEstimate, PredictorError>;
}

// -----------------------------------------------------------------------------
// Normalized autocorrelation
// -----------------------------------------------------------------------------

const MIN_FRAME: usize = 128;
const PRE_EMPHASIS: f32 = 0.97;
const ENERGY_GATE: f32 = 1e-6;
/// Minimum normalized correlation to call a frame voiced.
const VOICING_THRESHOLD: f32 = 0.5;
/// Earliest lag within this fraction of the best correlation wins (octave guard).
const NEAR_BEST: f32 = 0.9;

/// DC-removed, pre-emphasized normalized-autocorrelation F0 estimator.
pub struct AutocorrPredictor {
    x: Vec<f32>,
    corr: Vec<f32>,
}

impl Default for AutocorrPredictor {
    fn default() -> Self {
        Self::new(2048)
    }
}

impl AutocorrPredictor {
    pub fn new(frame_size: usize) -> Self {
        Self {
            x: Vec::with_capacity(frame_size),
            corr: Vec::with_capacity(frame_size / 2 + 1),
        }
    }

    /// Returns `(periodicity, f0)`; `(0, 0)` when the frame is too short or silent.
    fn estimate(&mut self, frame: &[f32], sample_rate: f32) -> (f32, f32) {
        let n = frame.len();
        if n < MIN_FRAME || !(sample_rate > 0.0) {
            return (0.0, 0.0);
        }

        let mean = frame.iter().sum::<f32>() / n as f32;
        self.x.clear();
        let mut prev = 0.0f32;
        for &v in frame {
            let d = v - mean;
            self.x.push(d - PRE_EMPHASIS * prev);
            prev = d;
        }

        let e0: f32 = self.x.iter().map(|v| v * v).sum();
        if e0 < ENERGY_GATE {
            return (0.0, 0.0);
        }

        let lag_min = ((sample_rate / MAX_PITCH_HZ).floor() as usize).clamp(2, n / 2);
        let lag_max = ((sample_rate / MIN_PITCH_HZ).ceil() as usize).clamp(lag_min + 1, n / 2);

        self.corr.clear();
        let mut best = 0.0f32;
        for lag in lag_min..=lag_max {
            let mut s = 0.0f32;
            let mut e1 = 0.0f32;
            let mut e2 = 0.0f32;
            for i in 0..(n - lag) {
                let a = self.x[i];
                let b = self.x[i + lag];
                s += a * b;
                e1 += a * a;
                e2 += b * b;
            }
            let r = (s / (e1 * e2).sqrt().max(1e-12)).clamp(-1.0, 1.0);
            best = best.max(r);
            self.corr.push(r);
        }
        if best <= 0.0 {
            return (0.0, 0.0);
        }

        // First local maximum close to the global one.
        let c = &self.corr;
        let pick = (0..c.len())
            .find(|&i| {
                let left = i == 0 || c[i] >= c[i - 1];
                let right = i + 1 == c.len() || c[i] >= c[i + 1];
                left && right && c[i] >= NEAR_BEST * best
            })
            .unwrap_or(0);

        (c[pick].clamp(0.0, 1.0), sample_rate / (lag_min + pick) as f32)
    }
}

impl PitchPredictor for AutocorrPredictor {
    fn name(&self) -> &str {
        "autocorr"
    }

    fn predict(&mut self, frame: &[f32], sample_rate: f32) -> Result<PitchEstimate, PredictorError> {
        let (periodicity, f0) = self.estimate(frame, sample_rate);
        if periodicity < VOICING_THRESHOLD || !(MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&f0) {
            return Ok(PitchEstimate::UNVOICED);
        }
        Ok(PitchEstimate {
            hz: f0,
            confidence: periodicity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_autocorr_sine() {
        let sr = 16000.0;
        let x: Vec<f32> = (0..2048)
            .map(|i| 0.5 * (2.0 * PI * 200.0 * i as f32 / sr).sin())
            .collect();
        let mut p = AutocorrPredictor::default();
        let est = p.predict(&x, sr).unwrap();
        assert!(est.is_voiced());
        assert!((est.hz - 200.0).abs() < 5.0, "got {}", est.hz);
    }

    #[test]
    fn test_autocorr_silence_and_short() {
        let mut p = AutocorrPredictor::default();
        assert_eq!(p.predict(&vec![0.0; 2048], 44100.0).unwrap(), PitchEstimate::UNVOICED);
        assert_eq!(p.predict(&[0.3; 64], 44100.0).unwrap(), PitchEstimate::UNVOICED);
    }

    #[test]
    fn test_error_display() {
        let e = PredictorError::Unavailable("no model".into());
        assert_eq!(e.to_string(), "pitch predictor unavailable: no model");
    }
}
