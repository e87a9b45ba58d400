//! Pre-processor: pre-emphasis and Hamming windowing shared by the spectral paths.
//!
//! Produces two views of the decimated frame:
//! - `windowed`: Hamming-windowed, no emphasis (harmonic amplitude measurements)
//! - `emphasized`: pre-emphasized then Hamming-windowed (LPC envelope)

use super::utils::make_hamming_window;

pub const DEFAULT_PRE_EMPHASIS: f32 = 0.97;

pub struct PreparedFrame<'a> {
    pub windowed: &'a [f32],
    pub emphasized: &'a [f32],
}

pub struct Preprocessor {
    coefficient: f32,
    window: Vec<f32>,
    windowed: Vec<f32>,
    emphasized: Vec<f32>,
}

impl Preprocessor {
    pub fn new(frame_len: usize, coefficient: f32) -> Self {
        Self {
            coefficient: coefficient.clamp(0.0, 0.999),
            window: make_hamming_window(frame_len),
            windowed: Vec::with_capacity(frame_len),
            emphasized: Vec::with_capacity(frame_len),
        }
    }

    pub fn prepare(&mut self, frame: &[f32]) -> PreparedFrame<'_> {
        if self.window.len() != frame.len() {
            self.window = make_hamming_window(frame.len());
        }

        self.windowed.clear();
        self.emphasized.clear();
        let mut prev = 0.0f32;
        for (i, (&x, &w)) in frame.iter().zip(self.window.iter()).enumerate() {
            self.windowed.push(x * w);
            let y = if i == 0 { x } else { x - self.coefficient * prev };
            prev = x;
            self.emphasized.push(y * w);
        }

        PreparedFrame {
            windowed: &self.windowed,
            emphasized: &self.emphasized,
        }
    }
}

/// First-order pre-emphasis `y[n] = x[n] - c * x[n-1]`, first sample passed through.
pub fn pre_emphasis(x: &[f32], coefficient: f32, out: &mut Vec<f32>) {
    out.clear();
    let mut prev = 0.0f32;
    for (i, &v) in x.iter().enumerate() {
        out.push(if i == 0 { v } else { v - coefficient * prev });
        prev = v;
    }
}
