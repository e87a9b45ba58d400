//! Pitch Smoother (median + octave-error correction)
//!
//! YIN occasionally locks onto twice or half the true period. This stage keeps a
//! short ring of recent voiced readings and:
//! - passes the raw value through until 3 readings are buffered
//! - halves readings ~2x the running median, doubles readings ~0.5x
//! - otherwise reports the median (outliers included, so they are absorbed)
//!
//! Unvoiced input never touches the ring.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::utils::median_with;

// =============================================================================
// Constants
// =============================================================================

pub const MIN_WINDOW: usize = 3;
pub const MAX_WINDOW: usize = 15;
pub const DEFAULT_WINDOW: usize = 5;

/// Below this many buffered readings the raw value is returned.
const MIN_READINGS_FOR_MEDIAN: usize = 3;

const OCTAVE_UP_BAND: (f32, f32) = (1.8, 2.2);
const OCTAVE_DOWN_BAND: (f32, f32) = (0.45, 0.55);

// =============================================================================
// Intensity presets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingIntensity {
    Low,
    #[default]
    Medium,
    High,
}

impl SmoothingIntensity {
    pub fn window_size(&self) -> usize {
        match self {
            SmoothingIntensity::Low => 3,
            SmoothingIntensity::Medium => 5,
            SmoothingIntensity::High => 9,
        }
    }
}

// =============================================================================
// Smoother
// =============================================================================

#[derive(Debug, Clone)]
pub struct PitchSmoother {
    window: usize,
    buffer: VecDeque<f32>,
    scratch: Vec<f32>,
}

impl Default for PitchSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PitchSmoother {
    pub fn new(window: usize) -> Self {
        let window = window.clamp(MIN_WINDOW, MAX_WINDOW);
        Self {
            window,
            buffer: VecDeque::with_capacity(MAX_WINDOW + 1),
            scratch: Vec::with_capacity(MAX_WINDOW + 1),
        }
    }

    pub fn with_intensity(intensity: SmoothingIntensity) -> Self {
        Self::new(intensity.window_size())
    }

    pub fn window_size(&self) -> usize {
        self.window
    }

    /// Resizes the ring (clamped to 3..=15), dropping the oldest readings if it shrinks.
    pub fn set_window_size(&mut self, window: usize) {
        self.window = window.clamp(MIN_WINDOW, MAX_WINDOW);
        while self.buffer.len() > self.window {
            self.buffer.pop_front();
        }
    }

    /// 0..100 %, where the minimum window is 0 and the maximum is 100.
    pub fn smoothing_intensity(&self) -> f32 {
        (self.window - MIN_WINDOW) as f32 / (MAX_WINDOW - MIN_WINDOW) as f32 * 100.0
    }

    pub fn buffer(&self) -> impl Iterator<Item = f32> + '_ {
        self.buffer.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the corrected pitch, or `None` for unvoiced input (`raw <= 0`).
    pub fn process(&mut self, raw: f32) -> Option<f32> {
        if !(raw > 0.0) || !raw.is_finite() {
            return None;
        }

        self.buffer.push_back(raw);
        while self.buffer.len() > self.window {
            self.buffer.pop_front();
        }

        if self.buffer.len() < MIN_READINGS_FOR_MEDIAN {
            return Some(raw);
        }

        let median = median_with(self.buffer.iter().copied(), &mut self.scratch);
        if median <= 0.0 {
            return Some(raw);
        }

        let ratio = raw / median;
        let corrected = if ratio > OCTAVE_UP_BAND.0 && ratio < OCTAVE_UP_BAND.1 {
            raw / 2.0
        } else if ratio > OCTAVE_DOWN_BAND.0 && ratio < OCTAVE_DOWN_BAND.1 {
            raw * 2.0
        } else {
            // Stable readings and gross outliers (>2.5x, <0.4x) both report the median.
            median
        };
        Some(corrected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unvoiced_passes_through_without_buffering() {
        let mut s = PitchSmoother::new(5);
        assert_eq!(s.process(-1.0), None);
        assert_eq!(s.process(0.0), None);
        assert_eq!(s.process(f32::NAN), None);
        assert!(s.is_empty());
    }

    #[test]
    fn test_raw_until_three_readings() {
        let mut s = PitchSmoother::new(5);
        assert_eq!(s.process(200.0), Some(200.0));
        assert_eq!(s.process(205.0), Some(205.0));
    }

    #[test]
    fn test_median_once_filled() {
        let mut s = PitchSmoother::new(5);
        for p in [200.0, 205.0, 210.0, 215.0] {
            s.process(p);
        }
        assert_eq!(s.process(220.0), Some(210.0));
    }

    #[test]
    fn test_octave_too_high_is_halved() {
        let mut s = PitchSmoother::new(5);
        for p in [200.0, 202.0, 198.0, 201.0] {
            s.process(p);
        }
        assert_eq!(s.process(400.0), Some(200.0));
    }

    #[test]
    fn test_octave_too_low_is_doubled() {
        let mut s = PitchSmoother::new(5);
        for p in [400.0, 402.0, 398.0, 401.0] {
            s.process(p);
        }
        assert_eq!(s.process(200.0), Some(400.0));
    }

    #[test]
    fn test_extreme_outlier_reports_median() {
        let mut s = PitchSmoother::new(5);
        for p in [200.0, 202.0, 198.0, 201.0] {
            s.process(p);
        }
        assert_eq!(s.process(1000.0), Some(201.0));
        assert!(s.process(500.0).unwrap() < 250.0);
    }

    #[test]
    fn test_ring_is_bounded_by_window() {
        let mut s = PitchSmoother::new(5);
        for i in 0..10 {
            s.process(200.0 + i as f32);
        }
        assert_eq!(s.len(), 5);
        s.reset();
        assert!(s.is_empty());
    }

    #[test]
    fn test_window_size_is_clamped_and_trims() {
        let mut s = PitchSmoother::new(5);
        s.set_window_size(1);
        assert_eq!(s.window_size(), 3);
        s.set_window_size(20);
        assert_eq!(s.window_size(), 15);

        for i in 0..10 {
            s.process(200.0 + i as f32);
        }
        s.set_window_size(3);
        assert!(s.len() <= 3);
        assert_eq!(s.buffer().collect::<Vec<_>>(), vec![207.0, 208.0, 209.0]);
    }

    #[test]
    fn test_intensity_percent() {
        let mut s = PitchSmoother::new(3);
        assert_eq!(s.smoothing_intensity(), 0.0);
        s.set_window_size(15);
        assert_eq!(s.smoothing_intensity(), 100.0);
        s.set_window_size(9);
        assert!((s.smoothing_intensity() - 50.0).abs() < 1e-4);
    }

    #[test]
    fn test_intensity_presets() {
        assert_eq!(PitchSmoother::with_intensity(SmoothingIntensity::Low).window_size(), 3);
        assert_eq!(PitchSmoother::with_intensity(SmoothingIntensity::Medium).window_size(), 5);
        assert_eq!(PitchSmoother::with_intensity(SmoothingIntensity::High).window_size(), 9);
        assert_eq!(PitchSmoother::default().window_size(), 5);
    }
}
