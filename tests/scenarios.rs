use std::f32::consts::PI;
use std::time::Duration;

use voxmetrics::dsp::lpc::{LpcModel, DEFAULT_ENVELOPE_POINTS, DEFAULT_LPC_ORDER};
use voxmetrics::dsp::signal_quality::{validate_signal, IssueKind, Severity};
use voxmetrics::dsp::{NoiseSuppressor, NoiseSuppressorConfig, PitchSmoother, YinEstimator};
use voxmetrics::session::{SessionSample, SessionStats};
use voxmetrics::{EngineConfig, OutputEvent, VoiceEngine};

fn sine(freq: f32, sr: f32, n: usize, amp: f32) -> Vec<f32> {
    (0..n)
        .map(|i| amp * (2.0 * PI * freq * i as f32 / sr).sin())
        .collect()
}

fn white_noise(n: usize, rms: f32, seed: u64) -> Vec<f32> {
    let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
    let raw: Vec<f32> = (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
        })
        .collect();
    let current = (raw.iter().map(|v| v * v).sum::<f32>() / n as f32).sqrt();
    raw.iter().map(|v| v * rms / current).collect()
}

fn rms(x: &[f32]) -> f32 {
    (x.iter().map(|v| v * v).sum::<f32>() / x.len().max(1) as f32).sqrt()
}

#[test]
fn scenario_a_sine_150hz_after_smoothing() {
    let sr = 44100.0;
    let signal = sine(150.0, sr, 2048 * 6, 0.5);
    let mut yin = YinEstimator::new(2048, 0.15);
    let mut smoother = PitchSmoother::default();
    let mut last = None;
    for frame in signal.chunks_exact(2048) {
        last = smoother.process(yin.estimate(frame, sr).hz);
    }
    let pitch = last.expect("voiced");
    assert!((pitch - 150.0).abs() <= 2.0, "pitch {pitch}");
}

#[test]
fn scenario_b_all_zero_buffer() {
    let zeros = vec![0.0f32; 2048];
    let mut lpc = LpcModel::new(DEFAULT_LPC_ORDER, DEFAULT_ENVELOPE_POINTS);
    let formants = lpc
        .analyze(&zeros, 11025.0)
        .map(|env| env.formants())
        .unwrap_or_default();
    assert!(formants.is_empty());

    let history: Vec<SessionSample> = zeros
        .iter()
        .map(|&v| SessionSample { pitch: v, volume: v })
        .collect();
    assert_eq!(
        SessionStats::compute(&history, Duration::ZERO),
        SessionStats::default()
    );
}

#[test]
fn scenario_c_noise_profile_lowers_noise() {
    let mut ns = NoiseSuppressor::new(NoiseSuppressorConfig::default());
    ns.capture_profile(&white_noise(2048 * 8, 0.05, 1)).unwrap();
    let noisy = white_noise(2048 * 4, 0.05, 2);
    let cleaned = ns.reduce(&noisy);
    assert_eq!(cleaned.len(), noisy.len());
    assert!(rms(&cleaned) < rms(&noisy));
}

#[test]
fn scenario_d_clipped_buffer() {
    let report = validate_signal(&vec![0.995f32; 2048]);
    assert!(!report.is_valid);
    let issue = report.issue(IssueKind::Clipping).expect("clipping flagged");
    assert_eq!(issue.severity, Severity::High);
}

#[test]
fn scenario_e_three_note_history() {
    let history = [
        SessionSample { pitch: 100.0, volume: 0.1 },
        SessionSample { pitch: 200.0, volume: 0.1 },
        SessionSample { pitch: 150.0, volume: 0.1 },
    ];
    let stats = SessionStats::compute(&history, Duration::from_secs(1));
    assert_eq!(stats.min_f0, 100.0);
    assert_eq!(stats.max_f0, 200.0);
    assert_eq!(stats.avg_f0, 150.0);
    assert!((stats.range_st - 12.0).abs() < 0.01);
}

#[test]
fn octave_errors_are_corrected() {
    let mut s = PitchSmoother::new(5);
    for p in [200.0, 201.0, 199.0, 200.0] {
        s.process(p);
    }
    assert_eq!(s.process(400.0), Some(200.0));

    let mut s = PitchSmoother::new(5);
    for p in [400.0, 401.0, 399.0, 400.0] {
        s.process(p);
    }
    assert_eq!(s.process(200.0), Some(400.0));
}

#[test]
fn engine_emits_gated_then_active_events() {
    let sr = 48000.0;
    let (mut engine, rx) = VoiceEngine::new(EngineConfig::default(), sr);

    let mut stream = vec![0.0f32; 2048];
    stream.extend(sine(220.0, sr, 2048 * 3, 0.3));
    for block in stream.chunks(128) {
        engine.process_block(block);
    }

    let updates = rx.drain();
    assert_eq!(updates.len(), 4);

    let gated = serde_json::to_value(OutputEvent::Update(updates[0].snapshot.clone())).unwrap();
    assert_eq!(gated["type"], "update");
    assert_eq!(gated["data"]["pitch"], -1.0);
    assert_eq!(gated["data"]["volume"], 0.0);
    assert_eq!(gated["data"]["vowel"], "");
    assert!(gated["data"]["spectrum"].is_null());

    let last = &updates[3].snapshot;
    assert!((last.pitch - 220.0).abs() < 3.0, "pitch {}", last.pitch);
    assert!(last.resonance > 0.0);
    assert!(last.volume > 0.2);
    assert!(last.jitter < 5.0);
}

#[test]
fn engine_resonance_decays_on_silence() {
    let sr = 44100.0;
    let (mut engine, rx) = VoiceEngine::new(EngineConfig::default(), sr);
    engine.process_block(&sine(180.0, sr, 2048 * 4, 0.3));
    let active = rx.drain().last().unwrap().snapshot.resonance;
    assert!(active > 100.0);

    engine.process_block(&vec![0.0f32; 2048]);
    let first_silent = rx.try_recv().unwrap().snapshot.resonance;
    assert!((first_silent - active * 0.9).abs() < 1e-2);

    engine.process_block(&vec![0.0f32; 2048 * 60]);
    let tail = rx.latest().unwrap().snapshot;
    assert_eq!(tail.resonance, 0.0);
}
