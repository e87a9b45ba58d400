//! Session-level aggregation.
//!
//! `SessionStats` is a pure function of a caller-owned history; the engine
//! keeps no history of its own. `ProsodyTracker` is a small consumer-side
//! helper for intonation feedback over the most recent readings.

use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dsp::utils::semitones_between;
use crate::VoiceMetricsSnapshot;

// =============================================================================
// Session statistics
// =============================================================================

/// Voiced-frame band for session statistics (exclusive).
const VOICED_MIN_HZ: f32 = 50.0;
const VOICED_MAX_HZ: f32 = 1000.0;

/// RMS floor before conversion to dB.
const SPL_FLOOR: f32 = 1e-5;
/// Offset so that RMS 1.0 maps to ~90 dB SPL.
const SPL_REFERENCE_DB: f32 = 90.0;

/// The two fields of a snapshot the aggregator reads.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionSample {
    pub pitch: f32,
    pub volume: f32,
}

impl From<&VoiceMetricsSnapshot> for SessionSample {
    fn from(s: &VoiceMetricsSnapshot) -> Self {
        Self {
            pitch: s.pitch,
            volume: s.volume,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub min_f0: f32,
    pub max_f0: f32,
    pub avg_f0: f32,
    /// Pitch range in semitones.
    pub range_st: f32,
    /// Mean approximate SPL over all frames, dB.
    pub avg_spl: f32,
    pub duration_secs: f64,
    /// Voiced frames / all frames.
    pub voiced_fraction: f32,
}

impl SessionStats {
    pub fn compute(history: &[SessionSample], duration: Duration) -> Self {
        let duration_secs = duration.as_secs_f64();

        let mut count = 0usize;
        let mut min_f0 = f32::INFINITY;
        let mut max_f0 = f32::NEG_INFINITY;
        let mut sum_f0 = 0.0f64;
        for s in history {
            if s.pitch > VOICED_MIN_HZ && s.pitch < VOICED_MAX_HZ {
                count += 1;
                min_f0 = min_f0.min(s.pitch);
                max_f0 = max_f0.max(s.pitch);
                sum_f0 += s.pitch as f64;
            }
        }

        if count == 0 {
            return Self {
                duration_secs,
                ..Self::default()
            };
        }

        let avg_spl = history
            .iter()
            .map(|s| 20.0 * s.volume.max(SPL_FLOOR).log10() + SPL_REFERENCE_DB)
            .sum::<f32>()
            / history.len() as f32;

        Self {
            min_f0: min_f0.round(),
            max_f0: max_f0.round(),
            avg_f0: (sum_f0 / count as f64).round() as f32,
            range_st: semitones_between(min_f0, max_f0),
            avg_spl,
            duration_secs,
            voiced_fraction: count as f32 / history.len() as f32,
        }
    }

    pub fn from_snapshots(snapshots: &[VoiceMetricsSnapshot], duration: Duration) -> Self {
        let samples: Vec<SessionSample> = snapshots.iter().map(SessionSample::from).collect();
        Self::compute(&samples, duration)
    }
}

// =============================================================================
// Prosody
// =============================================================================

const PROSODY_HISTORY: usize = 100;
const PROSODY_RECENT: usize = 20;
const PROSODY_MIN_VALID: usize = 10;
const PROSODY_MIN_RECENT: usize = 5;
const PROSODY_VALID_MIN_HZ: f32 = 50.0;
const PROSODY_VALID_MAX_HZ: f32 = 600.0;
const SLOPE_DEADBAND_HZ: f32 = 5.0;
/// An octave of movement counts as a fully expressive contour.
const FULL_CONTOUR_ST: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlopeDirection {
    Rising,
    Falling,
    #[default]
    Flat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProsodySummary {
    pub range_st: f32,
    /// 0..1, `range_st / 12` capped.
    pub contour: f32,
    pub slope: SlopeDirection,
}

#[derive(Debug, Clone, Default)]
pub struct ProsodyTracker {
    readings: VecDeque<f32>,
}

impl ProsodyTracker {
    pub fn new() -> Self {
        Self {
            readings: VecDeque::with_capacity(PROSODY_HISTORY + 1),
        }
    }

    /// Records one pitch reading; unvoiced readings are kept as 0.
    pub fn push(&mut self, pitch: f32) {
        let value = if pitch > 0.0 && pitch.is_finite() { pitch } else { 0.0 };
        self.readings.push_back(value);
        while self.readings.len() > PROSODY_HISTORY {
            self.readings.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn reset(&mut self) {
        self.readings.clear();
    }

    pub fn summary(&self) -> ProsodySummary {
        let valid: Vec<f32> = self
            .readings
            .iter()
            .copied()
            .filter(|&p| p > PROSODY_VALID_MIN_HZ && p < PROSODY_VALID_MAX_HZ)
            .collect();
        if valid.len() < PROSODY_MIN_VALID {
            return ProsodySummary::default();
        }

        let min = valid.iter().copied().fold(f32::INFINITY, f32::min);
        let max = valid.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let range_st = semitones_between(min, max);

        let recent = &valid[valid.len().saturating_sub(PROSODY_RECENT)..];
        let slope = if recent.len() < PROSODY_MIN_RECENT {
            SlopeDirection::Flat
        } else {
            let delta = recent[recent.len() - 1] - recent[0];
            if delta > SLOPE_DEADBAND_HZ {
                SlopeDirection::Rising
            } else if delta < -SLOPE_DEADBAND_HZ {
                SlopeDirection::Falling
            } else {
                SlopeDirection::Flat
            }
        };

        ProsodySummary {
            range_st,
            contour: (range_st / FULL_CONTOUR_ST).min(1.0),
            slope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(pitch: f32, volume: f32) -> SessionSample {
        SessionSample { pitch, volume }
    }

    #[test]
    fn test_three_note_history() {
        let history = [sample(100.0, 0.1), sample(200.0, 0.1), sample(150.0, 0.1)];
        let stats = SessionStats::compute(&history, Duration::from_secs(3));
        assert_eq!(stats.min_f0, 100.0);
        assert_eq!(stats.max_f0, 200.0);
        assert_eq!(stats.avg_f0, 150.0);
        assert!((stats.range_st - 12.0).abs() < 1e-4);
        assert!((stats.avg_spl - 70.0).abs() < 1e-3);
        assert_eq!(stats.voiced_fraction, 1.0);
        assert_eq!(stats.duration_secs, 3.0);
    }

    #[test]
    fn test_no_voiced_frames_is_all_zero() {
        let history = [sample(-1.0, 0.0), sample(30.0, 0.2), sample(1200.0, 0.3)];
        let stats = SessionStats::compute(&history, Duration::ZERO);
        assert_eq!(stats, SessionStats::default());
        assert_eq!(SessionStats::compute(&[], Duration::ZERO), SessionStats::default());
    }

    #[test]
    fn test_spl_averages_all_frames() {
        let history = [sample(200.0, 1.0), sample(-1.0, 0.0)];
        let stats = SessionStats::compute(&history, Duration::ZERO);
        // (90 + (-100 + 90)) / 2
        assert!((stats.avg_spl - 40.0).abs() < 1e-3);
        assert_eq!(stats.voiced_fraction, 0.5);
    }

    #[test]
    fn test_from_snapshots() {
        let mut snap = VoiceMetricsSnapshot::gated(0.0, 0.0);
        snap.pitch = 220.0;
        snap.volume = 0.1;
        let stats = SessionStats::from_snapshots(&[snap], Duration::from_millis(46));
        assert_eq!(stats.avg_f0, 220.0);
        assert_eq!(stats.range_st, 0.0);
    }

    #[test]
    fn test_prosody_needs_ten_valid_readings() {
        let mut t = ProsodyTracker::new();
        for i in 0..9 {
            t.push(200.0 + i as f32 * 10.0);
        }
        t.push(-1.0);
        assert_eq!(t.summary(), ProsodySummary::default());
    }

    #[test]
    fn test_prosody_rising_octave() {
        let mut t = ProsodyTracker::new();
        for i in 0..=10 {
            t.push(100.0 + i as f32 * 10.0);
        }
        let s = t.summary();
        assert!((s.range_st - 12.0).abs() < 1e-3);
        assert_eq!(s.contour, 1.0);
        assert_eq!(s.slope, SlopeDirection::Rising);
    }

    #[test]
    fn test_prosody_falling_and_flat() {
        let mut t = ProsodyTracker::new();
        for i in 0..12 {
            t.push(300.0 - i as f32 * 5.0);
        }
        assert_eq!(t.summary().slope, SlopeDirection::Falling);

        t.reset();
        for i in 0..12 {
            t.push(200.0 + (i % 2) as f32);
        }
        let s = t.summary();
        assert_eq!(s.slope, SlopeDirection::Flat);
        assert!(s.contour < 0.1);
    }

    #[test]
    fn test_prosody_history_is_bounded() {
        let mut t = ProsodyTracker::new();
        for _ in 0..250 {
            t.push(180.0);
        }
        assert_eq!(t.len(), 100);
    }
}
