//! Frame Buffer & Decimator
//!
//! Accumulates the host's small audio blocks (typically 128 samples) into
//! fixed-size analysis windows, and downsamples a window to the LPC analysis
//! rate by block averaging.
//!
//! # Design Notes
//! - The accumulator is a pre-sized SPSC ring; `push` never allocates
//! - Windows are non-overlapping: once a full window is popped the write side
//!   starts a fresh one
//! - Timestamps are stream time in seconds, derived from samples consumed

use ringbuf::{Consumer, Producer, RingBuffer};

// -----------------------------------------------------------------------------
// Constants
// -----------------------------------------------------------------------------

/// Ring capacity as a multiple of the analysis window, so a host block that
/// straddles a window boundary always fits.
const RINGBUF_CAP_MULT: usize = 2;

// -----------------------------------------------------------------------------
// Frame accumulator
// -----------------------------------------------------------------------------

pub struct FrameBuffer {
    input_prod: Producer<f32>,
    input_cons: Consumer<f32>,
    frame_size: usize,
    sample_rate: f32,
    samples_consumed: u64,
}

impl FrameBuffer {
    pub fn new(frame_size: usize, sample_rate: f32) -> Self {
        assert!(frame_size > 0, "frame size must be > 0");
        let cap = frame_size * RINGBUF_CAP_MULT;
        let (input_prod, input_cons) = RingBuffer::<f32>::new(cap).split();
        Self {
            input_prod,
            input_cons,
            frame_size,
            sample_rate: sample_rate.max(1.0),
            samples_consumed: 0,
        }
    }

    #[inline]
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Samples waiting for the current window to fill.
    #[inline]
    pub fn pending(&self) -> usize {
        self.input_cons.len()
    }

    /// Appends as much of `block` as fits; returns the number of samples taken.
    #[inline]
    pub fn push(&mut self, block: &[f32]) -> usize {
        self.input_prod.push_slice(block)
    }

    /// Moves one full window into `dest` and returns its start time in seconds,
    /// or `None` if the window is not full yet.
    pub fn pop_frame(&mut self, dest: &mut Vec<f32>) -> Option<f64> {
        if self.input_cons.len() < self.frame_size {
            return None;
        }
        dest.resize(self.frame_size, 0.0);
        let n = self.input_cons.pop_slice(&mut dest[..]);
        debug_assert_eq!(n, self.frame_size);

        let timestamp = self.samples_consumed as f64 / self.sample_rate as f64;
        self.samples_consumed += n as u64;
        Some(timestamp)
    }

    /// Drops buffered samples (e.g. on stream restart). Stream time keeps running.
    pub fn reset(&mut self) {
        let dropped = self.input_cons.len();
        while self.input_cons.pop().is_some() {}
        self.samples_consumed += dropped as u64;
    }
}

// -----------------------------------------------------------------------------
// Decimation
// -----------------------------------------------------------------------------

/// Integer decimation ratio for `input_rate -> target_rate` (1 = pass-through).
pub fn decimation_ratio(input_rate: f32, target_rate: f32) -> usize {
    if target_rate <= 0.0 || target_rate >= input_rate {
        return 1;
    }
    ((input_rate / target_rate).floor() as usize).max(1)
}

/// Block-averaging decimator. Writes into `out` and returns the effective
/// output rate (`input_rate / ratio`), which downstream frequency maps must use.
pub fn decimate(input: &[f32], input_rate: f32, target_rate: f32, out: &mut Vec<f32>) -> f32 {
    let ratio = decimation_ratio(input_rate, target_rate);
    out.clear();
    if ratio == 1 {
        out.extend_from_slice(input);
        return input_rate;
    }

    let inv = 1.0 / ratio as f32;
    out.extend(
        input
            .chunks_exact(ratio)
            .map(|block| block.iter().sum::<f32>() * inv),
    );
    input_rate / ratio as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_fires_only_when_full() {
        let mut fb = FrameBuffer::new(256, 44100.0);
        let mut frame = Vec::new();
        let block = [0.1f32; 128];

        assert_eq!(fb.push(&block), 128);
        assert!(fb.pop_frame(&mut frame).is_none());
        assert_eq!(fb.push(&block), 128);
        let ts = fb.pop_frame(&mut frame).expect("window full");
        assert_eq!(ts, 0.0);
        assert_eq!(frame.len(), 256);
        assert_eq!(fb.pending(), 0);
    }

    #[test]
    fn test_timestamps_advance_by_window() {
        let mut fb = FrameBuffer::new(100, 1000.0);
        let mut frame = Vec::new();
        let block = vec![0.0f32; 100];
        fb.push(&block);
        fb.pop_frame(&mut frame);
        fb.push(&block);
        let ts = fb.pop_frame(&mut frame).unwrap();
        assert!((ts - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_samples_keep_order_across_blocks() {
        let mut fb = FrameBuffer::new(4, 8.0);
        let mut frame = Vec::new();
        fb.push(&[1.0, 2.0, 3.0]);
        fb.push(&[4.0, 5.0]);
        fb.pop_frame(&mut frame).unwrap();
        assert_eq!(frame, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(fb.pending(), 1);
    }

    #[test]
    fn test_decimate_block_average() {
        let input: Vec<f32> = (0..8).map(|i| i as f32).collect();
        let mut out = Vec::new();
        let rate = decimate(&input, 4000.0, 1000.0, &mut out);
        assert_eq!(out, vec![1.5, 5.5]);
        assert_eq!(rate, 1000.0);
    }

    #[test]
    fn test_decimate_uses_floor_ratio() {
        let input = vec![1.0f32; 2048];
        let mut out = Vec::new();
        let rate = decimate(&input, 48000.0, 11025.0, &mut out);
        assert_eq!(out.len(), 512);
        assert_eq!(rate, 12000.0);
    }

    #[test]
    fn test_decimate_pass_through_when_target_not_lower() {
        let input = vec![0.25f32; 64];
        let mut out = Vec::new();
        let rate = decimate(&input, 11025.0, 22050.0, &mut out);
        assert_eq!(out, input);
        assert_eq!(rate, 11025.0);
    }
}
