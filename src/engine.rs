//! Real-time analysis engine.
//!
//! Owns every per-stream stage and runs one full analysis pass each time the
//! frame accumulator fills:
//!
//! ```text
//! block -> FrameBuffer -> Validator (gate) -> [NoiseSuppressor]
//!       -> YIN / predictor -> PitchSmoother
//!       -> Decimator -> Preprocessor -> LPC -> VoiceQuality
//!       -> VoiceMetricsSnapshot -> update channel
//! ```
//!
//! Nothing on this path returns an error or panics; degraded conditions map to
//! the gated/unvoiced snapshot and are logged once per condition.

use log::{debug, info, trace, warn};

use crate::channel::{update_channel, EngineUpdate, UpdateReceiver, UpdateSender};
use crate::config::{ControlMessage, EngineConfig};
use crate::dsp::frame_buffer::{decimate, decimation_ratio, FrameBuffer};
use crate::dsp::lpc::LpcModel;
use crate::dsp::noise_suppressor::{CaptureError, NoiseProfile, NoiseSuppressor};
use crate::dsp::pitch_smoother::PitchSmoother;
use crate::dsp::predictor::PitchPredictor;
use crate::dsp::preprocess::Preprocessor;
use crate::dsp::signal_quality::SignalQualityValidator;
use crate::dsp::utils::frame_rms;
use crate::dsp::voice_quality::VoiceQualityEstimator;
use crate::dsp::yin::{YinEstimator, MAX_PITCH_HZ, MIN_PITCH_HZ};
use crate::{AudioFrame, PitchEstimate, VoiceMetricsSnapshot};

const DEFAULT_SAMPLE_RATE: f32 = 44100.0;
const MIN_FRAME_SIZE: usize = 64;
/// Voiced predictor answers below this confidence defer to YIN.
const PREDICTOR_MIN_CONFIDENCE: f32 = 0.5;

fn in_pitch_range(hz: f32) -> bool {
    (MIN_PITCH_HZ..=MAX_PITCH_HZ).contains(&hz)
}

pub struct VoiceEngine {
    config: EngineConfig,
    sample_rate: f32,

    frames: FrameBuffer,
    validator: SignalQualityValidator,
    suppressor: NoiseSuppressor,
    yin: YinEstimator,
    predictor: Option<Box<dyn PitchPredictor>>,
    smoother: PitchSmoother,
    preprocessor: Preprocessor,
    lpc: LpcModel,
    quality: VoiceQualityEstimator,

    updates: UpdateSender,

    // Scratch
    frame: Vec<f32>,
    cleaned: Vec<f32>,
    decimated: Vec<f32>,

    // Latched warnings
    predictor_warned: bool,
}

impl VoiceEngine {
    /// Builds an engine for a stream at `sample_rate` and returns it with the
    /// consumer end of its update channel.
    pub fn new(mut config: EngineConfig, sample_rate: f32) -> (Self, UpdateReceiver) {
        let sample_rate = if sample_rate.is_finite() && sample_rate > 0.0 {
            sample_rate
        } else {
            warn!(
                "invalid sample rate {}, assuming {} Hz",
                sample_rate, DEFAULT_SAMPLE_RATE
            );
            DEFAULT_SAMPLE_RATE
        };
        config.frame_size = config.frame_size.max(MIN_FRAME_SIZE).next_power_of_two();

        let frame_size = config.frame_size;
        let analysis_len = frame_size / decimation_ratio(sample_rate, config.analysis_rate);
        let (updates, receiver) = update_channel(config.channel_capacity);

        info!(
            "voice engine: {} Hz input, {}-sample windows, LPC order {} at {} Hz",
            sample_rate, frame_size, config.lpc_order, config.analysis_rate
        );

        let engine = Self {
            frames: FrameBuffer::new(frame_size, sample_rate),
            validator: SignalQualityValidator::new(frame_size),
            suppressor: NoiseSuppressor::new(config.noise),
            yin: YinEstimator::new(frame_size, config.yin_threshold),
            predictor: None,
            smoother: PitchSmoother::with_intensity(config.smoothing),
            preprocessor: Preprocessor::new(analysis_len, config.pre_emphasis),
            lpc: LpcModel::new(config.lpc_order, config.envelope_points),
            quality: VoiceQualityEstimator::new(),
            updates,
            frame: Vec::with_capacity(frame_size),
            cleaned: Vec::with_capacity(frame_size),
            decimated: Vec::with_capacity(frame_size),
            predictor_warned: false,
            config,
            sample_rate,
        };
        (engine, receiver)
    }

    /// Substitutes an alternate pitch source ahead of YIN.
    pub fn with_predictor(mut self, predictor: Box<dyn PitchPredictor>) -> Self {
        info!("pitch predictor '{}' attached", predictor.name());
        self.predictor = Some(predictor);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn smoother(&self) -> &PitchSmoother {
        &self.smoother
    }

    pub fn dropped_updates(&self) -> u64 {
        self.updates.dropped()
    }

    // -------------------------------------------------------------------------
    // Audio path
    // -------------------------------------------------------------------------

    /// Feeds one host block; returns the number of analysis windows completed.
    pub fn process_block(&mut self, block: &[f32]) -> usize {
        let mut completed = 0;
        let mut rest = block;
        let mut frame = std::mem::take(&mut self.frame);
        loop {
            let taken = self.frames.push(rest);
            rest = &rest[taken..];

            let mut popped = false;
            while let Some(timestamp) = self.frames.pop_frame(&mut frame) {
                let update =
                    self.analyze_frame(AudioFrame::new(&frame, self.sample_rate, timestamp));
                self.updates.publish(update);
                completed += 1;
                popped = true;
            }

            if rest.is_empty() || (taken == 0 && !popped) {
                break;
            }
        }
        self.frame = frame;
        completed
    }

    /// One full analysis pass over a complete window.
    pub fn analyze_frame(&mut self, frame: AudioFrame<'_>) -> EngineUpdate {
        let rms = frame_rms(frame.samples);
        let quality = self.validator.validate(frame.samples);

        if !(rms > self.config.threshold) || !quality.is_valid {
            let resonance = self.quality.silent();
            trace!("t={:.3}s gated (rms {:.5})", frame.timestamp, rms);
            return EngineUpdate {
                snapshot: VoiceMetricsSnapshot::gated(frame.timestamp, resonance),
                quality,
            };
        }

        let samples: &[f32] = if self.suppressor.has_profile() {
            self.suppressor.reduce_into(frame.samples, &mut self.cleaned);
            &self.cleaned
        } else {
            frame.samples
        };

        let raw = Self::estimate_pitch(
            &mut self.predictor,
            &mut self.yin,
            &mut self.predictor_warned,
            samples,
            frame.sample_rate,
        );
        // Octave correction can step just outside the detector's range.
        let pitch = self
            .smoother
            .process(raw.hz)
            .filter(|&hz| in_pitch_range(hz))
            .unwrap_or(PitchEstimate::UNVOICED.hz);

        let analysis_rate = decimate(
            samples,
            frame.sample_rate,
            self.config.analysis_rate,
            &mut self.decimated,
        );
        let prepared = self.preprocessor.prepare(&self.decimated);
        let envelope = self.lpc.analyze(prepared.emphasized, analysis_rate);
        let formants = envelope.map(|env| env.formants()).unwrap_or_default();
        let spectrum = if self.config.emit_spectrum {
            envelope.map(|env| env.magnitudes().to_vec())
        } else {
            None
        };
        let vq = self
            .quality
            .active(envelope, &formants, raw.hz, prepared.windowed, analysis_rate);

        trace!(
            "t={:.3}s f0 {:.1} (raw {:.1}) f1 {:.0} f2 {:.0} res {:.0}",
            frame.timestamp,
            pitch,
            raw.hz,
            formants.f1_hz(),
            formants.f2_hz(),
            vq.resonance
        );

        EngineUpdate {
            snapshot: VoiceMetricsSnapshot {
                timestamp: frame.timestamp,
                pitch,
                resonance: vq.resonance,
                f1: formants.f1_hz(),
                f2: formants.f2_hz(),
                f3: formants.f3_hz(),
                weight: vq.weight,
                volume: rms,
                jitter: vq.jitter,
                vowel: vq.vowel,
                tilt: vq.tilt,
                spectrum,
                debug: Some(vq.debug),
            },
            quality,
        }
    }

    fn estimate_pitch(
        predictor: &mut Option<Box<dyn PitchPredictor>>,
        yin: &mut YinEstimator,
        warned: &mut bool,
        samples: &[f32],
        sample_rate: f32,
    ) -> PitchEstimate {
        if let Some(p) = predictor.as_mut() {
            match p.predict(samples, sample_rate) {
                Ok(est) if est.hz.is_finite() && est.hz <= 0.0 => {
                    *warned = false;
                    return PitchEstimate::UNVOICED;
                }
                Ok(est) if in_pitch_range(est.hz) && est.confidence >= PREDICTOR_MIN_CONFIDENCE => {
                    *warned = false;
                    return est;
                }
                Ok(est) => {
                    if !*warned {
                        warn!(
                            "predictor '{}' returned {} Hz at confidence {}; using YIN",
                            p.name(),
                            est.hz,
                            est.confidence
                        );
                        *warned = true;
                    }
                }
                Err(e) => {
                    if !*warned {
                        warn!("{}; falling back to YIN", e);
                        *warned = true;
                    }
                }
            }
        }
        yin.estimate(samples, sample_rate)
    }

    /// Drops buffered audio and smoothing history (stream restart).
    pub fn reset(&mut self) {
        self.frames.reset();
        self.smoother.reset();
        self.quality.reset();
        debug!("voice engine state reset");
    }

    // -------------------------------------------------------------------------
    // Control
    // -------------------------------------------------------------------------

    /// Parses and applies a JSON control message. Unparsable messages are
    /// logged and ignored; returns whether anything was applied.
    pub fn handle_message(&mut self, json: &str) -> bool {
        match ControlMessage::from_json(json) {
            Ok(msg) => {
                self.apply(msg);
                true
            }
            Err(e) => {
                warn!("ignoring control message: {}", e);
                false
            }
        }
    }

    pub fn apply(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Config { config: patch } => {
                self.config.apply_patch(&patch);
                if let Some(smoothing) = patch.smoothing {
                    self.smoother.set_window_size(smoothing.window_size());
                }
                info!(
                    "config updated: threshold {}, smoothing {:?}",
                    self.config.threshold, self.config.smoothing
                );
            }
        }
    }

    // -------------------------------------------------------------------------
    // Noise profile
    // -------------------------------------------------------------------------

    /// Captures a noise fingerprint from caller-verified silence. Must not be
    /// called while audio is being processed.
    pub fn capture_noise_profile(&mut self, silence: &[f32]) -> Result<&NoiseProfile, CaptureError> {
        self.suppressor.capture_profile(silence)
    }

    pub fn reset_noise_profile(&mut self) {
        self.suppressor.reset();
    }

    pub fn has_noise_profile(&self) -> bool {
        self.suppressor.has_profile()
    }

    pub fn set_noise_parameters(&mut self, alpha: f32, beta: f32, smoothing: f32) {
        self.suppressor.set_parameters(alpha, beta, smoothing);
        self.config.noise = self.suppressor.config();
    }
}
