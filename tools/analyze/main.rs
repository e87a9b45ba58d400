use anyhow::{bail, Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::PathBuf;
use std::time::Duration;
use voxmetrics::session::{ProsodyTracker, SessionStats};
use voxmetrics::{
    AutocorrPredictor, EngineConfig, PitchPredictor, PresetManager, VoiceEngine, VoiceMetricsSnapshot,
};

const HOST_BLOCK: usize = 128;

fn usage() -> ! {
    eprintln!("usage: analyze_wav <input.wav> [--preset NAME] [--config PATH] [--noise SECONDS] [--predictor yin|autocorr]");
    std::process::exit(2);
}

fn read_mono(input: &PathBuf) -> Result<(Vec<f32>, f32)> {
    let reader = WavReader::open(input)
        .with_context(|| format!("failed to open WAV '{}'", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("decoding float samples")?,
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()
            .context("decoding 16-bit samples")?,
        (SampleFormat::Int, bits @ (24 | 32)) => {
            let scale = (1i64 << (bits - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()
                .context("decoding integer samples")?
        }
        (format, bits) => bail!("unsupported WAV format: {:?} {}-bit", format, bits),
    };

    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate as f32))
}

fn main() -> Result<()> {
    let mut input = None;
    let mut preset = None;
    let mut config_path = None;
    let mut noise_secs = None;
    let mut predictor = String::from("yin");

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--preset" => preset = Some(args.next().unwrap_or_else(|| usage())),
            "--config" => config_path = Some(PathBuf::from(args.next().unwrap_or_else(|| usage()))),
            "--noise" => {
                let secs = args.next().unwrap_or_else(|| usage());
                noise_secs = Some(
                    secs.parse::<f32>()
                        .with_context(|| format!("invalid --noise value '{}'", secs))?,
                );
            }
            "--predictor" => predictor = args.next().unwrap_or_else(|| usage()),
            "-h" | "--help" => usage(),
            _ if input.is_none() => input = Some(PathBuf::from(arg)),
            other => bail!("unexpected argument '{}'", other),
        }
    }
    let input = input.unwrap_or_else(|| usage());

    let config = match (&config_path, &preset) {
        (Some(path), _) => EngineConfig::load(path)?,
        (None, Some(name)) => PresetManager::new()
            .get(name)
            .cloned()
            .with_context(|| format!("unknown preset '{}'", name))?,
        (None, None) => EngineConfig::default(),
    };

    let (samples, sample_rate) = read_mono(&input)?;
    let frame_size = config.frame_size;
    let (engine, updates) = VoiceEngine::new(config, sample_rate);
    let mut engine = match predictor.as_str() {
        "yin" => engine,
        "autocorr" => {
            let p: Box<dyn PitchPredictor> = Box::new(AutocorrPredictor::new(frame_size));
            engine.with_predictor(p)
        }
        other => bail!("unknown predictor '{}' (expected yin or autocorr)", other),
    };

    let mut start = 0;
    if let Some(secs) = noise_secs {
        let n = ((secs.max(0.0) * sample_rate) as usize).min(samples.len());
        let profile = engine
            .capture_noise_profile(&samples[..n])
            .context("capturing noise profile")?;
        println!("noise profile: {} frames from the first {:.2}s", profile.frames(), secs);
        start = n;
    }

    let mut snapshots: Vec<VoiceMetricsSnapshot> = Vec::new();
    let mut prosody = ProsodyTracker::new();
    for block in samples[start..].chunks(HOST_BLOCK) {
        engine.process_block(block);
        for update in updates.drain() {
            prosody.push(update.snapshot.pitch);
            snapshots.push(update.snapshot);
        }
    }

    let duration = Duration::from_secs_f64((samples.len() - start) as f64 / sample_rate as f64);
    let stats = SessionStats::from_snapshots(&snapshots, duration);
    let prosody = prosody.summary();

    println!("Session summary for '{}':", input.display());
    println!("  pitch source     : {}", predictor);
    println!("  windows analyzed : {}", snapshots.len());
    println!("  duration         : {:.2}s", stats.duration_secs);
    println!("  voiced fraction  : {:.0}%", stats.voiced_fraction * 100.0);
    println!("  F0 min/avg/max   : {}/{}/{} Hz", stats.min_f0, stats.avg_f0, stats.max_f0);
    println!("  range            : {:.1} st", stats.range_st);
    println!("  avg SPL (approx) : {:.1} dB", stats.avg_spl);
    println!(
        "  recent contour   : {:.2} ({:?}, {:.1} st)",
        prosody.contour, prosody.slope, prosody.range_st
    );
    if engine.dropped_updates() > 0 {
        println!("  dropped updates  : {}", engine.dropped_updates());
    }
    Ok(())
}
