use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::dsp::{NoiseSuppressorConfig, SmoothingIntensity};
use crate::VoiceMetricsSnapshot;

// =============================================================================
// ENGINE CONFIGURATION
// =============================================================================

/// Every knob the engine reads at construction. Missing JSON fields fall back
/// to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// RMS gate: frames at or below this are reported as silence.
    pub threshold: f32,
    /// Analysis window in samples (rounded up to a power of two).
    pub frame_size: usize,
    /// Target rate for the LPC path, Hz.
    pub analysis_rate: f32,
    pub lpc_order: usize,
    pub envelope_points: usize,
    pub yin_threshold: f32,
    pub pre_emphasis: f32,
    pub smoothing: SmoothingIntensity,
    /// Attach the LPC envelope to active snapshots.
    pub emit_spectrum: bool,
    pub channel_capacity: usize,
    pub noise: NoiseSuppressorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: 0.005,
            frame_size: 2048,
            analysis_rate: 11025.0,
            lpc_order: 14,
            envelope_points: 512,
            yin_threshold: 0.15,
            pre_emphasis: 0.97,
            smoothing: SmoothingIntensity::Medium,
            emit_spectrum: true,
            channel_capacity: 8,
            noise: NoiseSuppressorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing engine config JSON")
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading engine config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Overlays the fields present in a runtime patch.
    pub fn apply_patch(&mut self, patch: &ConfigPatch) {
        if let Some(threshold) = patch.threshold {
            if threshold.is_finite() && threshold >= 0.0 {
                self.threshold = threshold;
            }
        }
        if let Some(smoothing) = patch.smoothing {
            self.smoothing = smoothing;
        }
    }
}

// =============================================================================
// MESSAGES
// =============================================================================

/// Runtime control, e.g. `{"type":"config","config":{"threshold":0.01}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Config { config: ConfigPatch },
}

impl ControlMessage {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Optional overrides; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<SmoothingIntensity>,
}

/// Per-window output, serialized as `{"type":"update","data":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OutputEvent {
    Update(VoiceMetricsSnapshot),
}

impl OutputEvent {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// PRESETS
// =============================================================================

#[derive(Debug)]
pub struct PresetManager {
    presets: HashMap<String, EngineConfig>,
}

impl PresetManager {
    /// Loads the baked-in presets. Falls back to a lone "default" preset if the
    /// embedded JSON does not parse.
    pub fn new() -> Self {
        let presets_str = include_str!("../presets.json");
        match serde_json::from_str::<HashMap<String, EngineConfig>>(presets_str) {
            Ok(presets) => Self { presets },
            Err(e) => {
                log::warn!("embedded presets unreadable ({}), using defaults", e);
                Self::default()
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&EngineConfig> {
        self.presets.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.presets.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for PresetManager {
    fn default() -> Self {
        let mut presets = HashMap::new();
        presets.insert("default".to_string(), EngineConfig::default());
        Self { presets }
    }
}
