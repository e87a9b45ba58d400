//! Noise Suppressor (Static Spectral Subtraction)
//!
//! Two-phase filter: capture a stationary noise fingerprint during verified
//! silence, then subtract it from later audio.
//!
//! # Purpose
//! Removes steady room tone (fan hum, hiss) ahead of pitch/LPC analysis so the
//! estimators are not pulled by the noise floor.
//!
//! # Design Notes
//! - Capture is explicit and never overlaps reduction
//! - Profile is mean power per bin; oversubtraction (alpha) is applied at
//!   subtraction time so it can be retuned without recapturing
//! - Subtraction happens in the power domain with a magnitude floor of
//!   `beta * |X|`: `clean = sqrt(max(|X|^2 - alpha * N, (beta * |X|)^2))`
//! - Cleaned magnitudes are smoothed across frames; the original phase is kept
//! - Periodic Hann at 50% hop sums to a constant, so normalizing by
//!   `overlap * mean(window)` reconstructs unity-gain bins exactly
//! - No profile, or input shorter than one FFT frame: strict identity

use std::fmt;
use std::sync::Arc;

use log::{debug, info, warn};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use super::utils::{make_hann_window, MAG_FLOOR};

// -----------------------------------------------------------------------------
// Config
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseSuppressorConfig {
    pub fft_size: usize,
    /// Oversubtraction factor.
    pub alpha: f32,
    /// Spectral floor as a fraction of the observed magnitude.
    pub beta: f32,
    /// Weight of the previous frame's cleaned magnitude.
    pub smoothing: f32,
}

impl Default for NoiseSuppressorConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            alpha: 2.0,
            beta: 0.01,
            smoothing: 0.9,
        }
    }
}

// -----------------------------------------------------------------------------
// Profile & errors
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct NoiseProfile {
    mean_power: Vec<f32>,
    frames: usize,
}

impl NoiseProfile {
    /// Averaged power spectrum, bins `0..=fft_size/2`.
    pub fn mean_power(&self) -> &[f32] {
        &self.mean_power
    }

    /// Number of frames averaged into the profile.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn bins(&self) -> usize {
        self.mean_power.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    TooShort { needed: usize, got: usize },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::TooShort { needed, got } => write!(
                f,
                "noise capture needs at least {} samples of silence, got {}",
                needed, got
            ),
        }
    }
}

impl std::error::Error for CaptureError {}

// -----------------------------------------------------------------------------
// Suppressor
// -----------------------------------------------------------------------------

pub struct NoiseSuppressor {
    fft_size: usize,
    hop_size: usize,
    alpha: f32,
    beta: f32,
    smoothing: f32,

    profile: Option<NoiseProfile>,
    previous: Option<Vec<f32>>,

    fft: Arc<dyn Fft<f32>>,
    ifft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    norm: f32,

    // Scratch
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    ifft_scratch: Vec<Complex<f32>>,
    clean: Vec<f32>,
    padded: Vec<f32>,
    accum: Vec<f32>,
}

impl NoiseSuppressor {
    pub fn new(config: NoiseSuppressorConfig) -> Self {
        let fft_size = config.fft_size.max(4).next_power_of_two();
        let hop_size = fft_size / 2;

        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let ifft = planner.plan_fft_inverse(fft_size);
        let fft_scratch_len = fft.get_inplace_scratch_len();
        let ifft_scratch_len = ifft.get_inplace_scratch_len();

        let window = make_hann_window(fft_size);
        let window_mean = window.iter().sum::<f32>() / fft_size as f32;
        let overlap = (fft_size / hop_size) as f32;

        let mut suppressor = Self {
            fft_size,
            hop_size,
            alpha: 0.0,
            beta: 0.0,
            smoothing: 0.0,
            profile: None,
            previous: None,
            fft,
            ifft,
            window,
            norm: (overlap * window_mean).max(MAG_FLOOR),
            spectrum: vec![Complex::default(); fft_size],
            fft_scratch: vec![Complex::default(); fft_scratch_len],
            ifft_scratch: vec![Complex::default(); ifft_scratch_len],
            clean: vec![0.0; fft_size / 2 + 1],
            padded: Vec::new(),
            accum: Vec::new(),
        };
        suppressor.set_parameters(config.alpha, config.beta, config.smoothing);
        suppressor
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn has_profile(&self) -> bool {
        self.profile.is_some()
    }

    pub fn profile(&self) -> Option<&NoiseProfile> {
        self.profile.as_ref()
    }

    pub fn config(&self) -> NoiseSuppressorConfig {
        NoiseSuppressorConfig {
            fft_size: self.fft_size,
            alpha: self.alpha,
            beta: self.beta,
            smoothing: self.smoothing,
        }
    }

    /// Retunes subtraction without recapturing.
    pub fn set_parameters(&mut self, alpha: f32, beta: f32, smoothing: f32) {
        self.alpha = if alpha.is_finite() { alpha.max(0.0) } else { 2.0 };
        self.beta = if beta.is_finite() { beta.clamp(0.0, 1.0) } else { 0.01 };
        self.smoothing = if smoothing.is_finite() {
            smoothing.clamp(0.0, 0.999)
        } else {
            0.9
        };
    }

    /// Drops the profile and the temporal smoothing state.
    pub fn reset(&mut self) {
        if self.profile.take().is_some() {
            info!("noise profile cleared");
        }
        self.previous = None;
    }

    /// Averages the power spectrum over the non-overlapping frames of `silence`.
    pub fn capture_profile(&mut self, silence: &[f32]) -> Result<&NoiseProfile, CaptureError> {
        let n = self.fft_size;
        if silence.len() < n {
            warn!(
                "noise capture rejected: {} samples, need {}",
                silence.len(),
                n
            );
            return Err(CaptureError::TooShort {
                needed: n,
                got: silence.len(),
            });
        }

        let bins = n / 2 + 1;
        let mut mean_power = vec![0.0f32; bins];
        let frames = silence.len() / n;
        for frame in silence.chunks_exact(n) {
            self.forward(frame);
            for (acc, c) in mean_power.iter_mut().zip(self.spectrum.iter()) {
                *acc += c.norm_sqr();
            }
        }
        let inv = 1.0 / frames as f32;
        for p in mean_power.iter_mut() {
            *p *= inv;
        }

        info!(
            "noise profile captured: {} frames, fft {} (alpha {:.2})",
            frames, n, self.alpha
        );
        self.previous = None;
        Ok(&*self.profile.insert(NoiseProfile { mean_power, frames }))
    }

    pub fn reduce(&mut self, input: &[f32]) -> Vec<f32> {
        let mut out = Vec::with_capacity(input.len());
        self.reduce_into(input, &mut out);
        out
    }

    /// Writes the cleaned signal to `out` (same length as `input`).
    pub fn reduce_into(&mut self, input: &[f32], out: &mut Vec<f32>) {
        out.clear();
        let Some(noise) = self.profile.take() else {
            out.extend_from_slice(input);
            return;
        };
        if input.len() < self.fft_size {
            self.profile = Some(noise);
            out.extend_from_slice(input);
            return;
        }

        let n = self.fft_size;
        let hop = self.hop_size;

        // One hop of lead-in, then round up to whole hops plus one trailing hop.
        let body = hop + input.len();
        let total = body.div_ceil(hop) * hop + hop;
        let mut padded = std::mem::take(&mut self.padded);
        padded.clear();
        padded.resize(total, 0.0);
        padded[hop..hop + input.len()].copy_from_slice(input);

        let mut accum = std::mem::take(&mut self.accum);
        accum.clear();
        accum.resize(total, 0.0);

        let mut start = 0;
        let mut frames = 0usize;
        while start + n <= total {
            self.process_frame(&padded[start..start + n], &noise);
            for (i, c) in self.spectrum.iter().enumerate() {
                accum[start + i] += c.re;
            }
            start += hop;
            frames += 1;
        }

        let scale = 1.0 / (n as f32 * self.norm);
        out.extend(accum[hop..hop + input.len()].iter().map(|v| v * scale));
        debug!("noise suppressor: {} frames over {} samples", frames, input.len());

        self.padded = padded;
        self.accum = accum;
        self.profile = Some(noise);
    }

    /// Windowed forward FFT of `frame` into `self.spectrum`.
    fn forward(&mut self, frame: &[f32]) {
        for ((slot, &s), &w) in self.spectrum.iter_mut().zip(frame).zip(&self.window) {
            *slot = Complex::new(s * w, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);
    }

    /// Subtract, smooth and inverse-transform one frame; result is left
    /// (unnormalized) in `self.spectrum[..].re`.
    fn process_frame(&mut self, frame: &[f32], noise: &NoiseProfile) {
        let n = self.fft_size;
        let nyq = n / 2;
        self.forward(frame);

        let floor_sq = self.beta * self.beta;
        for (k, clean) in self.clean.iter_mut().enumerate() {
            let power = self.spectrum[k].norm_sqr();
            let noise_power = self.alpha * noise.mean_power[k];
            *clean = (power - noise_power).max(floor_sq * power).sqrt();
        }

        match self.previous.as_mut() {
            Some(prev) => {
                let s = self.smoothing;
                for (c, p) in self.clean.iter_mut().zip(prev.iter_mut()) {
                    *c = s * *p + (1.0 - s) * *c;
                    *p = *c;
                }
            }
            None => self.previous = Some(self.clean.clone()),
        }

        // Rescale each bin to the cleaned magnitude, keeping its phase.
        for k in 0..=nyq {
            let mag = self.spectrum[k].norm();
            self.spectrum[k] = if mag > MAG_FLOOR {
                self.spectrum[k] * (self.clean[k] / mag)
            } else {
                Complex::default()
            };
        }
        for k in 1..nyq {
            self.spectrum[n - k] = self.spectrum[k].conj();
        }

        self.ifft
            .process_with_scratch(&mut self.spectrum, &mut self.ifft_scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::utils::frame_rms;

    /// Deterministic uniform white noise scaled to the requested RMS.
    fn white_noise(n: usize, rms: f32, seed: u64) -> Vec<f32> {
        let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
        let raw: Vec<f32> = (0..n)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                ((state >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
            })
            .collect();
        let scale = rms / frame_rms(&raw).max(1e-9);
        raw.iter().map(|v| v * scale).collect()
    }

    fn small_config() -> NoiseSuppressorConfig {
        NoiseSuppressorConfig {
            fft_size: 256,
            ..Default::default()
        }
    }

    #[test]
    fn test_identity_without_profile() {
        let mut ns = NoiseSuppressor::new(small_config());
        let x = white_noise(1000, 0.1, 1);
        assert_eq!(ns.reduce(&x), x);
    }

    #[test]
    fn test_identity_when_shorter_than_frame() {
        let mut ns = NoiseSuppressor::new(small_config());
        ns.capture_profile(&white_noise(1024, 0.05, 2)).unwrap();
        let x = white_noise(100, 0.1, 3);
        assert_eq!(ns.reduce(&x), x);
    }

    #[test]
    fn test_capture_too_short() {
        let mut ns = NoiseSuppressor::new(small_config());
        let err = ns.capture_profile(&[0.0; 100]).unwrap_err();
        assert_eq!(err, CaptureError::TooShort { needed: 256, got: 100 });
        assert!(!ns.has_profile());
    }

    #[test]
    fn test_capture_counts_whole_frames() {
        let mut ns = NoiseSuppressor::new(small_config());
        let profile = ns.capture_profile(&white_noise(700, 0.05, 4)).unwrap();
        assert_eq!(profile.frames(), 2);
        assert_eq!(profile.bins(), 129);
    }

    #[test]
    fn test_output_length_matches_input() {
        let mut ns = NoiseSuppressor::new(small_config());
        ns.capture_profile(&white_noise(1024, 0.05, 5)).unwrap();
        for len in [256, 300, 511, 1000, 4097] {
            assert_eq!(ns.reduce(&white_noise(len, 0.1, len as u64)).len(), len);
        }
    }

    #[test]
    fn test_zero_profile_reconstructs_input() {
        let mut ns = NoiseSuppressor::new(NoiseSuppressorConfig {
            fft_size: 256,
            alpha: 2.0,
            beta: 0.01,
            smoothing: 0.0,
        });
        ns.capture_profile(&vec![0.0; 512]).unwrap();
        let x: Vec<f32> = (0..1000).map(|i| (i as f32 * 0.07).sin() * 0.3).collect();
        let y = ns.reduce(&x);
        for (a, b) in x.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn test_reduces_stationary_noise() {
        let mut ns = NoiseSuppressor::new(NoiseSuppressorConfig::default());
        ns.capture_profile(&white_noise(8192, 0.05, 11)).unwrap();
        let noisy = white_noise(8192, 0.05, 12);
        let cleaned = ns.reduce(&noisy);
        assert!(frame_rms(&cleaned) < 0.5 * frame_rms(&noisy));
    }

    #[test]
    fn test_reset_drops_profile() {
        let mut ns = NoiseSuppressor::new(small_config());
        ns.capture_profile(&white_noise(512, 0.05, 6)).unwrap();
        ns.reset();
        assert!(!ns.has_profile());
        let x = white_noise(600, 0.1, 7);
        assert_eq!(ns.reduce(&x), x);
    }

    #[test]
    fn test_parameters_are_sanitized() {
        let mut ns = NoiseSuppressor::new(small_config());
        ns.set_parameters(-1.0, 5.0, 2.0);
        let cfg = ns.config();
        assert_eq!(cfg.alpha, 0.0);
        assert_eq!(cfg.beta, 1.0);
        assert!(cfg.smoothing < 1.0);
    }
}
