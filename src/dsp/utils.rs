//! Shared numeric helpers for the analysis stages.

use std::f32::consts::PI;

/// Smallest magnitude/energy treated as non-zero in divisions and logs.
pub const DB_EPS: f32 = 1e-10;

/// Magnitude floor used when normalizing spectral bins.
pub const MAG_FLOOR: f32 = 1e-12;

pub fn lin_to_db(x: f32) -> f32 {
    20.0 * x.max(DB_EPS).log10()
}

pub fn frame_rms(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v * v;
    }
    (s / (x.len().max(1) as f32)).sqrt()
}

pub fn frame_mean(x: &[f32]) -> f32 {
    let mut s = 0.0f32;
    for &v in x {
        s += v;
    }
    s / (x.len().max(1) as f32)
}

/// Symmetric Hamming window (`0.54 - 0.46 cos`), as used for LPC framing.
pub fn make_hamming_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f32;
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f32 / denom).cos())
        .collect()
}

/// Periodic Hann window. Sums to exactly 1.0 at 50% overlap.
pub fn make_hann_window(n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    let denom = n as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / denom).cos()))
        .collect()
}

/// Median of `values`, using `scratch` for the sort. Even lengths average the two middle values.
pub fn median_with(values: impl IntoIterator<Item = f32>, scratch: &mut Vec<f32>) -> f32 {
    scratch.clear();
    scratch.extend(values);
    if scratch.is_empty() {
        return 0.0;
    }
    scratch.sort_by(|a, b| a.total_cmp(b));
    let half = scratch.len() / 2;
    if scratch.len() % 2 == 1 {
        scratch[half]
    } else {
        0.5 * (scratch[half - 1] + scratch[half])
    }
}

/// Magnitude of a single DFT bin at an arbitrary frequency (direct sum, no FFT).
pub fn single_bin_magnitude(x: &[f32], freq_hz: f32, sample_rate: f32) -> f32 {
    if sample_rate <= 0.0 || x.is_empty() {
        return 0.0;
    }
    let omega = 2.0 * PI * freq_hz / sample_rate;
    let mut re = 0.0f32;
    let mut im = 0.0f32;
    for (i, &v) in x.iter().enumerate() {
        let phase = omega * i as f32;
        re += v * phase.cos();
        im -= v * phase.sin();
    }
    (re * re + im * im).sqrt()
}

/// Distance between two frequencies in semitones.
pub fn semitones_between(low_hz: f32, high_hz: f32) -> f32 {
    if low_hz <= 0.0 || high_hz <= 0.0 {
        return 0.0;
    }
    12.0 * (high_hz / low_hz).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms_of_empty_is_zero() {
        assert_eq!(frame_rms(&[]), 0.0);
        assert_eq!(frame_mean(&[]), 0.0);
    }

    #[test]
    fn test_hann_is_cola_at_half_overlap() {
        let n = 64;
        let w = make_hann_window(n);
        for i in 0..n / 2 {
            assert!((w[i] + w[i + n / 2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_hamming_endpoints() {
        let w = make_hamming_window(32);
        assert!((w[0] - 0.08).abs() < 1e-6);
        assert!((w[31] - 0.08).abs() < 1e-6);
    }

    #[test]
    fn test_median_odd_and_even() {
        let mut scratch = Vec::new();
        assert_eq!(median_with([3.0, 1.0, 2.0], &mut scratch), 2.0);
        assert_eq!(median_with([4.0, 1.0, 2.0, 3.0], &mut scratch), 2.5);
        assert_eq!(median_with(std::iter::empty(), &mut scratch), 0.0);
    }

    #[test]
    fn test_single_bin_finds_tone() {
        let sr = 8000.0;
        let x: Vec<f32> = (0..800)
            .map(|i| (2.0 * PI * 200.0 * i as f32 / sr).sin())
            .collect();
        let on = single_bin_magnitude(&x, 200.0, sr);
        let off = single_bin_magnitude(&x, 450.0, sr);
        assert!(on > 10.0 * off);
    }

    #[test]
    fn test_octave_is_twelve_semitones() {
        assert!((semitones_between(100.0, 200.0) - 12.0).abs() < 1e-4);
        assert_eq!(semitones_between(0.0, 200.0), 0.0);
    }
}
