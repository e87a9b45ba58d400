//! Signal Quality Validator
//!
//! Judges whether a raw analysis frame is trustworthy before any pitch or
//! formant work is done on it.
//!
//! # Checks
//! - **Clipping**: peak above 0.99 full scale (high severity)
//! - **Silence**: RMS below 0.001 (high severity)
//! - **DC offset**: |mean| above 0.05 (medium severity)
//! - **Low SNR**: estimated SNR below 10 dB (medium severity)
//!
//! The SNR estimate compares the full-frame RMS with the RMS of the quietest
//! 10% of samples (by absolute value), clamped to 0..60 dB.
//!
//! # Design Notes
//! - Never fails: empty or all-zero frames report `silence` with confidence 0
//! - `is_valid` is false iff a high-severity issue is present
//! - The validator owns a scratch buffer sized at construction; `validate` does
//!   not grow it for frames up to that size

use serde::Serialize;

use super::utils::{frame_mean, DB_EPS};

// =============================================================================
// Constants
// =============================================================================

const CLIPPING_THRESHOLD: f32 = 0.99;
const SILENCE_RMS_THRESHOLD: f32 = 0.001;
const DC_OFFSET_THRESHOLD: f32 = 0.05;
const LOW_SNR_THRESHOLD_DB: f32 = 10.0;

/// Fraction of samples (quietest first) used as the noise-floor estimate.
const NOISE_FLOOR_FRACTION: f32 = 0.1;
/// Below this noise floor the frame is treated as essentially noise-free.
const NOISE_FLOOR_MIN: f32 = 1e-5;
const CLEAN_SNR_DB: f32 = 50.0;
const SNR_MAX_DB: f32 = 60.0;

/// Confidence ramps linearly from 0 at 5 dB to 1 at 35 dB.
const CONFIDENCE_SNR_FLOOR_DB: f32 = 5.0;
const CONFIDENCE_SNR_SPAN_DB: f32 = 30.0;

const GOOD_FOR_ANALYSIS_CONFIDENCE: f32 = 0.5;

// =============================================================================
// Report types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Clipping,
    Silence,
    DcOffset,
    LowSnr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: &'static str,
}

impl QualityIssue {
    fn new(kind: IssueKind) -> Self {
        let (severity, message) = match kind {
            IssueKind::Clipping => (
                Severity::High,
                "Audio is clipping. Move away from the microphone or reduce input gain.",
            ),
            IssueKind::Silence => (
                Severity::High,
                "No audio detected. Check the microphone connection and permissions.",
            ),
            IssueKind::DcOffset => (
                Severity::Medium,
                "Audio has a DC bias. This may affect analysis accuracy.",
            ),
            IssueKind::LowSnr => (
                Severity::Medium,
                "High background noise detected. A quieter environment gives better results.",
            ),
        };
        Self {
            kind,
            severity,
            message,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalMetrics {
    pub max_amplitude: f32,
    pub rms: f32,
    pub dc_offset: f32,
    pub snr_db: f32,
}

/// Coarse grade for UI copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityGrade {
    pub fn from_confidence(confidence: f32) -> Self {
        if confidence > 0.8 {
            QualityGrade::Excellent
        } else if confidence > 0.6 {
            QualityGrade::Good
        } else if confidence > 0.4 {
            QualityGrade::Fair
        } else {
            QualityGrade::Poor
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            QualityGrade::Excellent => "Excellent signal quality",
            QualityGrade::Good => "Good signal quality",
            QualityGrade::Fair => "Fair signal quality - results may be less accurate",
            QualityGrade::Poor => "Poor signal quality - please check your setup",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalQualityReport {
    pub is_valid: bool,
    pub issues: Vec<QualityIssue>,
    pub confidence: f32,
    pub metrics: SignalMetrics,
}

impl SignalQualityReport {
    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    pub fn issue(&self, kind: IssueKind) -> Option<&QualityIssue> {
        self.issues.iter().find(|i| i.kind == kind)
    }

    /// Valid and confident enough that downstream metrics are worth showing.
    pub fn is_good_for_analysis(&self) -> bool {
        self.is_valid && self.confidence > GOOD_FOR_ANALYSIS_CONFIDENCE
    }

    pub fn grade(&self) -> QualityGrade {
        QualityGrade::from_confidence(self.confidence)
    }
}

/// Maps an SNR estimate to a 0..1 confidence. Monotonic non-decreasing in `snr_db`.
pub fn confidence_from_snr(snr_db: f32) -> f32 {
    ((snr_db - CONFIDENCE_SNR_FLOOR_DB) / CONFIDENCE_SNR_SPAN_DB).clamp(0.0, 1.0)
}

// =============================================================================
// Validator
// =============================================================================

pub struct SignalQualityValidator {
    abs_scratch: Vec<f32>,
}

impl SignalQualityValidator {
    pub fn new(max_frame: usize) -> Self {
        Self {
            abs_scratch: Vec::with_capacity(max_frame),
        }
    }

    pub fn validate(&mut self, frame: &[f32]) -> SignalQualityReport {
        let mut max_amplitude = 0.0f32;
        let mut energy = 0.0f32;
        for &s in frame {
            max_amplitude = max_amplitude.max(s.abs());
            energy += s * s;
        }
        let rms = if frame.is_empty() {
            0.0
        } else {
            (energy / frame.len() as f32).sqrt()
        };
        let dc_offset = frame_mean(frame);
        let snr_db = self.estimate_snr(frame, rms);

        let mut issues = Vec::new();
        if max_amplitude > CLIPPING_THRESHOLD {
            issues.push(QualityIssue::new(IssueKind::Clipping));
        }
        let silent = rms < SILENCE_RMS_THRESHOLD;
        if silent {
            issues.push(QualityIssue::new(IssueKind::Silence));
        }
        if dc_offset.abs() > DC_OFFSET_THRESHOLD {
            issues.push(QualityIssue::new(IssueKind::DcOffset));
        }
        if snr_db < LOW_SNR_THRESHOLD_DB {
            issues.push(QualityIssue::new(IssueKind::LowSnr));
        }

        let is_valid = !issues.iter().any(|i| i.severity == Severity::High);
        let confidence = if silent {
            0.0
        } else {
            confidence_from_snr(snr_db)
        };

        SignalQualityReport {
            is_valid,
            issues,
            confidence,
            metrics: SignalMetrics {
                max_amplitude,
                rms,
                dc_offset,
                snr_db,
            },
        }
    }

    fn estimate_snr(&mut self, frame: &[f32], rms: f32) -> f32 {
        if frame.is_empty() || rms < DB_EPS {
            return 0.0;
        }

        let quiet_count = ((frame.len() as f32 * NOISE_FLOOR_FRACTION) as usize).max(1);
        self.abs_scratch.clear();
        self.abs_scratch.extend(frame.iter().map(|s| s.abs()));
        // Partition so the quietest `quiet_count` samples come first.
        if quiet_count < self.abs_scratch.len() {
            self.abs_scratch
                .select_nth_unstable_by(quiet_count - 1, |a, b| a.total_cmp(b));
        }
        let quiet = &self.abs_scratch[..quiet_count];
        let noise_floor =
            (quiet.iter().map(|s| s * s).sum::<f32>() / quiet_count as f32).sqrt();

        if noise_floor < NOISE_FLOOR_MIN {
            return CLEAN_SNR_DB;
        }
        (20.0 * (rms / noise_floor).log10()).clamp(0.0, SNR_MAX_DB)
    }
}

/// One-shot validation for callers that do not keep a validator around.
pub fn validate_signal(frame: &[f32]) -> SignalQualityReport {
    SignalQualityValidator::new(frame.len()).validate(frame)
}
