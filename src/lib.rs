pub mod channel;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod session;

pub use crate::channel::{update_channel, EngineUpdate, UpdateReceiver, UpdateSender};
pub use crate::config::{ConfigPatch, ControlMessage, EngineConfig, OutputEvent, PresetManager};
pub use crate::dsp::{
    AutocorrPredictor, CaptureError, NoiseProfile, NoiseSuppressor, NoiseSuppressorConfig, PitchPredictor,
    PredictorError, SignalQualityReport, SmoothingIntensity,
};
pub use crate::engine::VoiceEngine;
pub use crate::session::{ProsodySummary, ProsodyTracker, SessionSample, SessionStats, SlopeDirection};

use serde::{Deserialize, Serialize};

// =============================================================================
// CANONICAL DATA STRUCTURES
// =============================================================================

/// One analysis window as handed to the per-frame stages.
///
/// Transient: built by the frame accumulator, dropped after one pass.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    pub samples: &'a [f32],
    pub sample_rate: f32,
    /// Stream time of the first sample, in seconds.
    pub timestamp: f64,
}

impl<'a> AudioFrame<'a> {
    pub fn new(samples: &'a [f32], sample_rate: f32, timestamp: f64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate > 0.0 {
            self.samples.len() as f64 / self.sample_rate as f64
        } else {
            0.0
        }
    }
}

/// Fundamental frequency or the unvoiced sentinel (-1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    pub hz: f32,
    pub confidence: f32,
}

impl PitchEstimate {
    pub const UNVOICED: PitchEstimate = PitchEstimate {
        hz: -1.0,
        confidence: 0.0,
    };

    #[inline]
    pub fn is_voiced(&self) -> bool {
        self.hz > 0.0
    }

    pub fn voiced_hz(&self) -> Option<f32> {
        self.is_voiced().then_some(self.hz)
    }
}

impl Default for PitchEstimate {
    fn default() -> Self {
        Self::UNVOICED
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Formant {
    pub frequency: f32,
    /// Half-power width read off the sampled envelope; informational.
    pub bandwidth: f32,
    pub magnitude: f32,
}

/// Up to one formant per conventional band. Band order implies strictly
/// ascending frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FormantSet {
    pub f1: Option<Formant>,
    pub f2: Option<Formant>,
    pub f3: Option<Formant>,
}

impl FormantSet {
    pub fn iter(&self) -> impl Iterator<Item = &Formant> + '_ {
        [&self.f1, &self.f2, &self.f3]
            .into_iter()
            .filter_map(|f| f.as_ref())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.f1.is_none() && self.f2.is_none() && self.f3.is_none()
    }

    /// F1 in Hz, 0 when absent (wire convention).
    pub fn f1_hz(&self) -> f32 {
        self.f1.map_or(0.0, |f| f.frequency)
    }

    pub fn f2_hz(&self) -> f32 {
        self.f2.map_or(0.0, |f| f.frequency)
    }

    pub fn f3_hz(&self) -> f32 {
        self.f3.map_or(0.0, |f| f.frequency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vowel {
    /// High-front.
    #[serde(rename = "i")]
    I,
    /// Low-central.
    #[serde(rename = "a")]
    A,
    /// High-back.
    #[serde(rename = "u")]
    U,
    /// Mid-back.
    #[serde(rename = "o")]
    O,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl Vowel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vowel::I => "i",
            Vowel::A => "a",
            Vowel::U => "u",
            Vowel::O => "o",
            Vowel::Unknown => "",
        }
    }
}

/// Smoothed harmonic levels behind the vocal-weight score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightDebug {
    #[serde(rename = "h1db")]
    pub h1_db: f32,
    #[serde(rename = "h2db")]
    pub h2_db: f32,
    #[serde(rename = "diffDb")]
    pub diff_db: f32,
}

/// Externally observable result of one analysis window. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceMetricsSnapshot {
    #[serde(skip)]
    pub timestamp: f64,
    /// Smoothed F0 in Hz, or -1 when unvoiced or gated.
    pub pitch: f32,
    /// Smoothed spectral centroid of the LPC envelope, Hz.
    pub resonance: f32,
    pub f1: f32,
    pub f2: f32,
    #[serde(default)]
    pub f3: f32,
    /// 0 (breathy) .. 1 (pressed).
    pub weight: f32,
    /// Frame RMS.
    pub volume: f32,
    /// Hz.
    pub jitter: f32,
    pub vowel: Vowel,
    #[serde(default)]
    pub tilt: f32,
    pub spectrum: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<WeightDebug>,
}

impl VoiceMetricsSnapshot {
    /// Below-threshold shape: unvoiced, decayed resonance, everything else zeroed.
    pub fn gated(timestamp: f64, resonance: f32) -> Self {
        Self {
            timestamp,
            pitch: -1.0,
            resonance,
            f1: 0.0,
            f2: 0.0,
            f3: 0.0,
            weight: 0.0,
            volume: 0.0,
            jitter: 0.0,
            vowel: Vowel::Unknown,
            tilt: 0.0,
            spectrum: None,
            debug: None,
        }
    }

    pub fn is_voiced(&self) -> bool {
        self.pitch > 0.0
    }
}
