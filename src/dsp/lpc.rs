//! LPC Spectral Model
//!
//! Autocorrelation -> Levinson-Durbin -> all-pole envelope -> formant peak picking.
//!
//! # Purpose
//! Models the vocal tract as an all-pole filter `G / A(z)` and reads resonance
//! (formant) frequencies off its magnitude response.
//!
//! # Design Notes
//! - `A(z) = 1 + a1 z^-1 + ... + ap z^-p`, `a[0] = 1`
//! - The envelope is sampled at a fixed number of points from 0 Hz to Nyquist
//!   inclusive; formants are local maxima of that curve, not polynomial roots.
//!   Bandwidths come from half-power points on the sampled curve and are
//!   informational only
//! - Degenerate input (too short, zero energy) yields no envelope and an empty
//!   `FormantSet`; nothing here panics or produces NaN
//! - All working buffers are sized at construction

use crate::{Formant, FormantSet};

use super::utils::DB_EPS;

// =============================================================================
// Constants
// =============================================================================

pub const DEFAULT_LPC_ORDER: usize = 14;
pub const DEFAULT_ENVELOPE_POINTS: usize = 512;

/// Conventional formant search bands (Hz). F1 is open at both ends, F2/F3 are [low, high).
pub const F1_BAND: (f32, f32) = (200.0, 1000.0);
pub const F2_BAND: (f32, f32) = (1000.0, 2500.0);
pub const F3_BAND: (f32, f32) = (2500.0, 4500.0);

/// Peaks broader than this are treated as spurious.
pub const FORMANT_BW_MAX: f32 = 700.0;

const HALF_POWER: f32 = std::f32::consts::FRAC_1_SQRT_2;

// Spectral tilt bands (Hz)
const TILT_LOW_MAX_HZ: f32 = 1000.0;
const TILT_HIGH_MAX_HZ: f32 = 4000.0;

// =============================================================================
// Core recursions
// =============================================================================

/// Biased autocorrelation `r[k] = sum x[i] x[i+k]` for `k in 0..r.len()`.
pub fn autocorrelate(x: &[f32], r: &mut [f32]) {
    for (lag, slot) in r.iter_mut().enumerate() {
        let mut sum = 0.0f32;
        if lag < x.len() {
            for i in 0..x.len() - lag {
                sum += x[i] * x[i + lag];
            }
        }
        *slot = sum;
    }
}

/// Levinson-Durbin recursion.
///
/// Fills `a` (length `order + 1`) with the inverse-filter coefficients and
/// returns the final prediction error, or `None` when `r[0]` carries no energy.
/// `scratch` must be at least as long as `a`.
pub fn levinson_durbin(r: &[f32], a: &mut [f32], scratch: &mut [f32]) -> Option<f32> {
    let order = a.len().saturating_sub(1);
    if r.len() <= order || scratch.len() < a.len() {
        return None;
    }
    if !(r[0] > DB_EPS) {
        return None;
    }

    a.fill(0.0);
    a[0] = 1.0;
    let mut err = r[0];

    for i in 1..=order {
        let mut acc = r[i];
        for j in 1..i {
            acc += a[j] * r[i - j];
        }
        let k = -acc / err;
        if !k.is_finite() || k.abs() >= 1.0 {
            // Numerically unstable beyond this order; keep the stable prefix.
            break;
        }

        scratch[..=i].copy_from_slice(&a[..=i]);
        for j in 1..i {
            a[j] = scratch[j] + k * scratch[i - j];
        }
        a[i] = k;

        err *= 1.0 - k * k;
        if err <= DB_EPS {
            break;
        }
    }

    Some(err.max(DB_EPS))
}

// =============================================================================
// Spectral envelope
// =============================================================================

/// Linear magnitude of `G / A(e^jw)` sampled from 0 Hz to Nyquist inclusive.
#[derive(Debug, Clone, Default)]
pub struct SpectralEnvelope {
    magnitudes: Vec<f32>,
    nyquist: f32,
}

impl SpectralEnvelope {
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitudes
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn nyquist(&self) -> f32 {
        self.nyquist
    }

    pub fn bin_hz(&self) -> f32 {
        if self.magnitudes.len() < 2 {
            0.0
        } else {
            self.nyquist / (self.magnitudes.len() - 1) as f32
        }
    }

    #[inline]
    pub fn frequency(&self, index: usize) -> f32 {
        index as f32 * self.bin_hz()
    }

    /// Amplitude-weighted mean frequency.
    pub fn centroid(&self) -> f32 {
        let bin_hz = self.bin_hz();
        let mut sum_freq = 0.0f32;
        let mut sum_amp = 0.0f32;
        for (i, &m) in self.magnitudes.iter().enumerate() {
            sum_freq += i as f32 * bin_hz * m;
            sum_amp += m;
        }
        if sum_amp > DB_EPS {
            sum_freq / sum_amp
        } else {
            0.0
        }
    }

    /// Envelope energy below 1 kHz divided by energy in 1-4 kHz. 0 when the upper band is empty.
    pub fn tilt(&self) -> f32 {
        let mut low = 0.0f32;
        let mut high = 0.0f32;
        for (i, &m) in self.magnitudes.iter().enumerate() {
            let f = self.frequency(i);
            if f < TILT_LOW_MAX_HZ {
                low += m * m;
            } else if f < TILT_HIGH_MAX_HZ {
                high += m * m;
            }
        }
        if high > DB_EPS {
            low / high
        } else {
            0.0
        }
    }

    /// Picks the strongest well-formed peak in each of the F1/F2/F3 bands.
    pub fn formants(&self) -> FormantSet {
        let mut set = FormantSet::default();
        let m = &self.magnitudes;
        if m.len() < 3 {
            return set;
        }

        for i in 1..m.len() - 1 {
            if !(m[i] > m[i - 1] && m[i] > m[i + 1]) {
                continue;
            }
            let freq = self.frequency(i);
            let slot = if freq > F1_BAND.0 && freq < F1_BAND.1 {
                &mut set.f1
            } else if in_band(freq, F2_BAND) {
                &mut set.f2
            } else if in_band(freq, F3_BAND) {
                &mut set.f3
            } else {
                continue;
            };

            let bandwidth = self.half_power_bandwidth(i);
            if bandwidth > FORMANT_BW_MAX {
                continue;
            }
            if slot.map_or(true, |prev| m[i] > prev.magnitude) {
                *slot = Some(Formant {
                    frequency: freq,
                    bandwidth,
                    magnitude: m[i],
                });
            }
        }
        set
    }

    /// -3 dB width around a peak, interpolated between grid points. If only one
    /// side reaches half power the width is mirrored from that side.
    fn half_power_bandwidth(&self, peak: usize) -> f32 {
        let m = &self.magnitudes;
        let bin_hz = self.bin_hz();
        let target = m[peak] * HALF_POWER;

        let mut left = None;
        let mut j = peak;
        while j > 0 {
            if m[j - 1] < target {
                let t = (m[j] - target) / (m[j] - m[j - 1]).max(DB_EPS);
                left = Some((peak - j) as f32 + t);
                break;
            }
            j -= 1;
        }

        let mut right = None;
        let mut j = peak;
        while j + 1 < m.len() {
            if m[j + 1] < target {
                let t = (m[j] - target) / (m[j] - m[j + 1]).max(DB_EPS);
                right = Some((j - peak) as f32 + t);
                break;
            }
            j += 1;
        }

        let bins = match (left, right) {
            (Some(l), Some(r)) => l + r,
            (Some(side), None) | (None, Some(side)) => 2.0 * side,
            (None, None) => (m.len() - 1) as f32,
        };
        (bins * bin_hz).max(0.0)
    }
}

#[inline]
fn in_band(freq: f32, band: (f32, f32)) -> bool {
    freq >= band.0 && freq < band.1
}

// =============================================================================
// Model
// =============================================================================

pub struct LpcModel {
    order: usize,
    r: Vec<f32>,
    a: Vec<f32>,
    scratch: Vec<f32>,
    error: f32,
    envelope: SpectralEnvelope,
}

impl LpcModel {
    pub fn new(order: usize, envelope_points: usize) -> Self {
        let order = order.max(1);
        let points = envelope_points.max(3);
        Self {
            order,
            r: vec![0.0; order + 1],
            a: vec![0.0; order + 1],
            scratch: vec![0.0; order + 1],
            error: 0.0,
            envelope: SpectralEnvelope {
                magnitudes: vec![0.0; points],
                nyquist: 0.0,
            },
        }
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// `[1, a1, ..., ap]` from the most recent successful analysis.
    pub fn coefficients(&self) -> &[f32] {
        &self.a
    }

    pub fn prediction_error(&self) -> f32 {
        self.error
    }

    /// Fits the model to a pre-processed (emphasized, windowed) frame.
    /// Returns `None` when the frame is too short or carries no energy.
    pub fn analyze(&mut self, frame: &[f32], sample_rate: f32) -> Option<&SpectralEnvelope> {
        if frame.len() < self.order + 1 || !(sample_rate > 0.0) {
            return None;
        }

        autocorrelate(frame, &mut self.r);
        let error = levinson_durbin(&self.r, &mut self.a, &mut self.scratch)?;
        self.error = error;

        self.envelope.nyquist = sample_rate / 2.0;
        let gain = error.sqrt();
        let points = self.envelope.magnitudes.len();
        let step = std::f32::consts::PI / (points - 1) as f32;
        for (i, slot) in self.envelope.magnitudes.iter_mut().enumerate() {
            let omega = step * i as f32;
            let mut re = 0.0f32;
            let mut im = 0.0f32;
            for (k, &ak) in self.a.iter().enumerate() {
                let phase = omega * k as f32;
                re += ak * phase.cos();
                im -= ak * phase.sin();
            }
            let mag_a = (re * re + im * im).sqrt().max(DB_EPS);
            *slot = gain / mag_a;
        }

        Some(&self.envelope)
    }
}

/// Convenience: formants of a pre-processed frame, empty on degenerate input.
pub fn formants_of(frame: &[f32], sample_rate: f32, order: usize) -> FormantSet {
    let mut model = LpcModel::new(order, DEFAULT_ENVELOPE_POINTS);
    model
        .analyze(frame, sample_rate)
        .map(SpectralEnvelope::formants)
        .unwrap_or_default()
}
