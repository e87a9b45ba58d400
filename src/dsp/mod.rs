pub mod frame_buffer;
pub mod lpc;
pub mod noise_suppressor;
pub mod pitch_smoother;
pub mod predictor;
pub mod preprocess;
pub mod signal_quality;
pub mod utils;
pub mod voice_quality;
pub mod yin;

pub use frame_buffer::{decimate, decimation_ratio, FrameBuffer};
pub use lpc::{LpcModel, SpectralEnvelope};
pub use noise_suppressor::{CaptureError, NoiseProfile, NoiseSuppressor, NoiseSuppressorConfig};
pub use pitch_smoother::{PitchSmoother, SmoothingIntensity};
pub use predictor::{AutocorrPredictor, PitchPredictor, PredictorError};
pub use preprocess::{PreparedFrame, Preprocessor};
pub use signal_quality::{
    validate_signal, IssueKind, QualityGrade, QualityIssue, Severity, SignalMetrics,
    SignalQualityReport, SignalQualityValidator,
};
pub use voice_quality::{classify_vowel, VoiceQuality, VoiceQualityEstimator};
pub use yin::YinEstimator;
