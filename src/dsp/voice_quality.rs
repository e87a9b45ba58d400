//! Voice-Quality Estimator
//!
//! Turns the per-frame pitch and LPC envelope into the perceptual scalars the
//! feedback layer displays: resonance (smoothed spectral centroid), spectral
//! tilt, vocal weight (H1-H2), jitter and a coarse vowel label.
//!
//! # Design Notes
//! - All trackers are bounded rings; nothing grows with session length
//! - Resonance never drops to 0 abruptly: on a gated (silent) frame it decays
//!   by 0.9 per frame and snaps to 0 below 50 Hz
//! - Jitter runs on the raw (unsmoothed) pitch
//! - Weight is 0..1 (1 = pressed, 0 = breathy); frames where H1/H2 cannot be
//!   measured contribute the neutral 0.5

use std::collections::VecDeque;

use crate::{FormantSet, Vowel, WeightDebug};

use super::lpc::SpectralEnvelope;
use super::utils::{lin_to_db, median_with, single_bin_magnitude};

// =============================================================================
// Constants
// =============================================================================

const RESONANCE_HISTORY: usize = 5;
const RESONANCE_ALPHA_SLOW: f32 = 0.1;
const RESONANCE_ALPHA_FAST: f32 = 0.3;
const RESONANCE_JUMP_HZ: f32 = 200.0;
const RESONANCE_DECAY: f32 = 0.9;
const RESONANCE_FLOOR_HZ: f32 = 50.0;

const WEIGHT_HISTORY: usize = 5;
const WEIGHT_NEUTRAL: f32 = 0.5;
const WEIGHT_MAX_DIFF_DB: f32 = 15.0;
const HARMONIC_DEBUG_SMOOTHING: f32 = 0.9;
const MIN_WEIGHT_PITCH_HZ: f32 = 50.0;

const JITTER_HISTORY: usize = 5;

// =============================================================================
// Resonance
// =============================================================================

/// Median-of-5 centroid followed by an adaptive EMA.
#[derive(Debug, Clone, Default)]
pub struct ResonanceTracker {
    history: VecDeque<f32>,
    scratch: Vec<f32>,
    smoothed: f32,
}

impl ResonanceTracker {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(RESONANCE_HISTORY + 1),
            scratch: Vec::with_capacity(RESONANCE_HISTORY + 1),
            smoothed: 0.0,
        }
    }

    pub fn value(&self) -> f32 {
        self.smoothed
    }

    pub fn update(&mut self, centroid: f32) -> f32 {
        let centroid = if centroid.is_finite() { centroid.max(0.0) } else { 0.0 };
        self.history.push_back(centroid);
        while self.history.len() > RESONANCE_HISTORY {
            self.history.pop_front();
        }

        let median = median_with(self.history.iter().copied(), &mut self.scratch);
        let alpha = if (median - self.smoothed).abs() > RESONANCE_JUMP_HZ {
            RESONANCE_ALPHA_FAST
        } else {
            RESONANCE_ALPHA_SLOW
        };
        self.smoothed = self.smoothed * (1.0 - alpha) + median * alpha;
        self.smoothed
    }

    /// Gated-frame rule: geometric decay, snapping to 0 under the floor.
    pub fn decay(&mut self) -> f32 {
        self.smoothed *= RESONANCE_DECAY;
        if self.smoothed < RESONANCE_FLOOR_HZ {
            self.smoothed = 0.0;
        }
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.smoothed = 0.0;
    }
}

// =============================================================================
// Vocal weight (H1-H2)
// =============================================================================

/// Levels of the first two harmonics in dB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicLevels {
    pub h1_db: f32,
    pub h2_db: f32,
}

impl HarmonicLevels {
    /// Measures |X(f0)| and |X(2 f0)| on a windowed frame. `None` when unvoiced
    /// or either harmonic has no energy.
    pub fn measure(windowed: &[f32], f0: f32, sample_rate: f32) -> Option<Self> {
        if !(f0 > MIN_WEIGHT_PITCH_HZ) || !(sample_rate > 0.0) {
            return None;
        }
        let h1 = single_bin_magnitude(windowed, f0, sample_rate);
        let h2 = single_bin_magnitude(windowed, 2.0 * f0, sample_rate);
        if !(h1 > 0.0 && h2 > 0.0) {
            return None;
        }
        Some(Self {
            h1_db: lin_to_db(h1),
            h2_db: lin_to_db(h2),
        })
    }

    pub fn diff_db(&self) -> f32 {
        self.h1_db - self.h2_db
    }
}

/// 0 dB -> 1.0 (pressed), >= 15 dB -> 0.0 (breathy).
pub fn weight_from_diff(diff_db: f32) -> f32 {
    if !diff_db.is_finite() {
        return WEIGHT_NEUTRAL;
    }
    1.0 - diff_db.clamp(0.0, WEIGHT_MAX_DIFF_DB) / WEIGHT_MAX_DIFF_DB
}

#[derive(Debug, Clone, Default)]
pub struct WeightTracker {
    history: VecDeque<f32>,
    h1_db: Option<f32>,
    h2_db: Option<f32>,
}

impl WeightTracker {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(WEIGHT_HISTORY + 1),
            h1_db: None,
            h2_db: None,
        }
    }

    /// Pushes one frame's weight and returns the trailing average.
    pub fn update(&mut self, levels: Option<HarmonicLevels>) -> f32 {
        let weight = levels.map_or(WEIGHT_NEUTRAL, |l| weight_from_diff(l.diff_db()));
        self.history.push_back(weight);
        while self.history.len() > WEIGHT_HISTORY {
            self.history.pop_front();
        }

        let (h1, h2) = levels.map_or((0.0, 0.0), |l| (l.h1_db, l.h2_db));
        self.h1_db = Some(smooth_db(self.h1_db, h1));
        self.h2_db = Some(smooth_db(self.h2_db, h2));

        self.history.iter().sum::<f32>() / self.history.len() as f32
    }

    pub fn debug(&self) -> WeightDebug {
        let h1_db = self.h1_db.unwrap_or(0.0);
        let h2_db = self.h2_db.unwrap_or(0.0);
        WeightDebug {
            h1_db,
            h2_db,
            diff_db: h1_db - h2_db,
        }
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.h1_db = None;
        self.h2_db = None;
    }
}

/// Exponential smoothing primed by the first non-zero reading.
fn smooth_db(prev: Option<f32>, value: f32) -> f32 {
    let prev = match prev {
        Some(p) if p != 0.0 => p,
        _ => value,
    };
    prev * HARMONIC_DEBUG_SMOOTHING + value * (1.0 - HARMONIC_DEBUG_SMOOTHING)
}

// =============================================================================
// Jitter
// =============================================================================

/// Mean |delta pitch| over the last 5 consecutive voiced pairs.
#[derive(Debug, Clone, Default)]
pub struct JitterTracker {
    last: Option<f32>,
    diffs: VecDeque<f32>,
}

impl JitterTracker {
    pub fn new() -> Self {
        Self {
            last: None,
            diffs: VecDeque::with_capacity(JITTER_HISTORY + 1),
        }
    }

    /// Any non-positive reading counts as loss of voicing and clears the history.
    pub fn update(&mut self, pitch: f32) -> f32 {
        if !(pitch > 0.0) {
            self.reset();
            return 0.0;
        }
        let Some(last) = self.last.replace(pitch) else {
            return 0.0;
        };

        self.diffs.push_back((pitch - last).abs());
        while self.diffs.len() > JITTER_HISTORY {
            self.diffs.pop_front();
        }
        self.diffs.iter().sum::<f32>() / self.diffs.len() as f32
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.diffs.clear();
    }
}

// =============================================================================
// Vowel classification
// =============================================================================

/// Four broad (F1, F2) buckets. Missing formants never classify.
pub fn classify_vowel(f1: Option<f32>, f2: Option<f32>) -> Vowel {
    let (Some(f1), Some(f2)) = (f1, f2) else {
        return Vowel::Unknown;
    };
    if f1 < 500.0 && f2 > 2000.0 {
        Vowel::I
    } else if f1 > 600.0 && f2 > 1200.0 && f2 < 1800.0 {
        Vowel::A
    } else if f1 < 500.0 && f2 < 1200.0 {
        Vowel::U
    } else if f1 > 500.0 && f1 < 800.0 && f2 < 1200.0 {
        Vowel::O
    } else {
        Vowel::Unknown
    }
}

// =============================================================================
// Estimator
// =============================================================================

/// Per-frame voice-quality readout for an active (above-gate) frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceQuality {
    pub resonance: f32,
    pub tilt: f32,
    pub weight: f32,
    pub jitter: f32,
    pub vowel: Vowel,
    pub debug: WeightDebug,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceQualityEstimator {
    resonance: ResonanceTracker,
    weight: WeightTracker,
    jitter: JitterTracker,
}

impl VoiceQualityEstimator {
    pub fn new() -> Self {
        Self {
            resonance: ResonanceTracker::new(),
            weight: WeightTracker::new(),
            jitter: JitterTracker::new(),
        }
    }

    pub fn resonance(&self) -> f32 {
        self.resonance.value()
    }

    /// `windowed` is the Hamming-windowed (un-emphasized) analysis frame at
    /// `sample_rate`; `raw_pitch` is the unsmoothed estimate (`<= 0` = unvoiced).
    pub fn active(
        &mut self,
        envelope: Option<&SpectralEnvelope>,
        formants: &FormantSet,
        raw_pitch: f32,
        windowed: &[f32],
        sample_rate: f32,
    ) -> VoiceQuality {
        let (centroid, tilt) = envelope.map_or((0.0, 0.0), |env| (env.centroid(), env.tilt()));
        let resonance = self.resonance.update(centroid);

        let levels = HarmonicLevels::measure(windowed, raw_pitch, sample_rate);
        let weight = self.weight.update(levels);
        let jitter = self.jitter.update(raw_pitch);
        let vowel = classify_vowel(formants.f1.map(|f| f.frequency), formants.f2.map(|f| f.frequency));

        VoiceQuality {
            resonance,
            tilt,
            weight,
            jitter,
            vowel,
            debug: self.weight.debug(),
        }
    }

    /// Gated frame: resonance decays, voicing is considered lost. Returns the
    /// decayed resonance.
    pub fn silent(&mut self) -> f32 {
        self.jitter.reset();
        self.resonance.decay()
    }

    pub fn reset(&mut self) {
        self.resonance.reset();
        self.weight.reset();
        self.jitter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_resonance_fast_alpha_on_large_jump() {
        let mut r = ResonanceTracker::new();
        // median 1000, jump > 200 from 0 => alpha 0.3
        assert!((r.update(1000.0) - 300.0).abs() < 1e-3);
    }

    #[test]
    fn test_resonance_slow_alpha_on_small_change() {
        let mut r = ResonanceTracker::new();
        for _ in 0..200 {
            r.update(1000.0);
        }
        let before = r.value();
        let after = r.update(1100.0);
        // median of history is still 1000, small step
        assert!((after - before).abs() < 20.0);
    }

    #[test]
    fn test_resonance_decay_and_snap() {
        let mut r = ResonanceTracker::new();
        for _ in 0..200 {
            r.update(1000.0);
        }
        let v = r.value();
        assert!((r.decay() - v * 0.9).abs() < 1e-3);
        for _ in 0..100 {
            r.decay();
        }
        assert_eq!(r.value(), 0.0);
    }

    #[test]
    fn test_weight_mapping() {
        assert_eq!(weight_from_diff(0.0), 1.0);
        assert_eq!(weight_from_diff(-3.0), 1.0);
        assert_eq!(weight_from_diff(15.0), 0.0);
        assert_eq!(weight_from_diff(40.0), 0.0);
        assert!((weight_from_diff(7.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_weight_neutral_when_unvoiced() {
        let mut w = WeightTracker::new();
        assert_eq!(w.update(None), 0.5);
    }

    #[test]
    fn test_weight_moving_average() {
        let mut w = WeightTracker::new();
        let pressed = HarmonicLevels { h1_db: 0.0, h2_db: 0.0 };
        let breathy = HarmonicLevels { h1_db: 20.0, h2_db: 0.0 };
        w.update(Some(pressed));
        assert!((w.update(Some(breathy)) - 0.5).abs() < 1e-6);
        for _ in 0..5 {
            w.update(Some(breathy));
        }
        assert_eq!(w.update(Some(breathy)), 0.0);
    }

    #[test]
    fn test_harmonic_levels_on_breathy_tone() {
        let sr = 11025.0;
        let f0 = 200.0;
        let x: Vec<f32> = (0..512)
            .map(|i| {
                let t = i as f32 / sr;
                (2.0 * PI * f0 * t).sin() + 0.05 * (2.0 * PI * 2.0 * f0 * t).sin()
            })
            .collect();
        let levels = HarmonicLevels::measure(&x, f0, sr).expect("voiced");
        assert!(levels.diff_db() > 10.0);
        assert!(HarmonicLevels::measure(&x, -1.0, sr).is_none());
    }

    #[test]
    fn test_jitter_mean_abs_diff_and_reset() {
        let mut j = JitterTracker::new();
        assert_eq!(j.update(200.0), 0.0);
        assert_eq!(j.update(202.0), 2.0);
        assert_eq!(j.update(198.0), 3.0);
        assert_eq!(j.update(-1.0), 0.0);
        assert_eq!(j.update(300.0), 0.0);
    }

    #[test]
    fn test_vowel_table() {
        assert_eq!(classify_vowel(Some(300.0), Some(2300.0)), Vowel::I);
        assert_eq!(classify_vowel(Some(750.0), Some(1400.0)), Vowel::A);
        assert_eq!(classify_vowel(Some(350.0), Some(900.0)), Vowel::U);
        assert_eq!(classify_vowel(Some(600.0), Some(1000.0)), Vowel::O);
        assert_eq!(classify_vowel(Some(550.0), Some(1900.0)), Vowel::Unknown);
        assert_eq!(classify_vowel(None, Some(900.0)), Vowel::Unknown);
    }

    #[test]
    fn test_silent_frame_resets_jitter() {
        let mut est = VoiceQualityEstimator::new();
        let empty = FormantSet::default();
        let frame = vec![0.0f32; 256];
        est.active(None, &empty, 200.0, &frame, 11025.0);
        let q = est.active(None, &empty, 210.0, &frame, 11025.0);
        assert_eq!(q.jitter, 10.0);
        est.silent();
        let q = est.active(None, &empty, 220.0, &frame, 11025.0);
        assert_eq!(q.jitter, 0.0);
        assert_eq!(q.vowel, Vowel::Unknown);
    }
}
