//! Audio export tool
//!
//! Runs the audio export stage over a raw PCM file and writes the encoded
//! elementary stream. Usage:
//!
//! ```text
//! audio-export <input.pcm> <output> [config.toml]
//! ```

use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audio_exporter::config::{EncoderBackend, ExportConfig, LoggingSettings};
use audio_exporter::encoder::{EncoderFactory, PassthroughEncoderFactory};
use audio_exporter::graph::PcmQueueSource;
use audio_exporter::sink::memory::SinkSummary;
use audio_exporter::sink::MemorySink;
use audio_exporter::{
    AudioSampleExporter, ExportError, FallbackTracker, OutputRelay, ProcessOutcome, Result,
    SampleExporter,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "audio-export";

/// Consecutive idle steps after which the export is considered stuck
const MAX_IDLE_STEPS: usize = 1_000;

#[derive(Debug, Serialize)]
struct ExportSummary {
    session: String,
    input_bytes: u64,
    fallback_applied: bool,
    output: SinkSummary,
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("usage: {} <input.pcm> <output> [config.toml]", APP_NAME);
        std::process::exit(2);
    }
    let input_path = &args[1];
    let output_path = &args[2];
    let config_path = args.get(3).map(String::as_str).unwrap_or("config.toml");
    let (config, load_error) = load_config(config_path);

    init_logging(&config.logging);
    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    if let Some(e) = load_error {
        tracing::warn!(
            "Failed to load config file {}: {}. Using defaults.",
            config_path,
            e
        );
    }
    tracing::info!("Configuration loaded: {:?}", config);
    config.validate()?;

    let pcm = Bytes::from(std::fs::read(input_path)?);
    tracing::info!(bytes = pcm.len(), path = %input_path, "input read");

    let factory = encoder_factory(&config)?;
    let mut tracker = FallbackTracker::new(config.request.clone());
    let sink = MemorySink::new(config.sink.supported_codecs.clone());

    let mut exporter = AudioSampleExporter::new(
        config.input.asset_codec,
        config.input.audio_format(),
        &config.request,
        PcmQueueSource::new,
        factory.as_ref(),
        &sink,
        &mut tracker,
    )?;

    let chunk = config.input.read_chunk_bytes;
    let mut offset = 0;
    while offset < pcm.len() {
        let end = (offset + chunk).min(pcm.len());
        exporter.source_mut().queue_input(pcm.slice(offset..end));
        offset = end;
    }
    exporter.source_mut().signal_end_of_input();

    let mut relay = OutputRelay::new(sink);
    let mut idle_steps = 0;
    loop {
        match relay.process_data(&mut exporter)? {
            ProcessOutcome::Ended => break,
            ProcessOutcome::Progress => idle_steps = 0,
            ProcessOutcome::NoProgress => {
                idle_steps += 1;
                if idle_steps > MAX_IDLE_STEPS {
                    exporter.release();
                    return Err(ExportError::Muxing(format!(
                        "export stalled after {} idle steps",
                        MAX_IDLE_STEPS
                    )));
                }
            }
        }
    }

    let input_bytes = exporter.total_input_bytes();
    let session = exporter.session_id().to_string();
    exporter.release();

    let sink = relay.into_sink();
    std::fs::write(output_path, sink.elementary_stream())?;
    tracing::info!(path = %output_path, samples = sink.samples().len(), "output written");

    let summary = ExportSummary {
        session,
        input_bytes,
        fallback_applied: tracker.fallback_applied(),
        output: sink.summary(),
    };
    let json = serde_json::to_string_pretty(&summary)
        .map_err(|e| ExportError::Config(format!("cannot serialize summary: {}", e)))?;
    println!("{}", json);

    Ok(())
}

/// Load the config file if present, defaults otherwise.
///
/// A file that exists but cannot be loaded yields the defaults together
/// with the error, to be logged once logging is up.
fn load_config(path: &str) -> (ExportConfig, Option<ExportError>) {
    if !Path::new(path).exists() {
        return (ExportConfig::default(), None);
    }
    match ExportConfig::from_file(path) {
        Ok(config) => (config, None),
        Err(e) => (ExportConfig::default(), Some(e)),
    }
}

fn encoder_factory(config: &ExportConfig) -> Result<Box<dyn EncoderFactory>> {
    match config.encoder.backend {
        EncoderBackend::Passthrough => Ok(Box::new(PassthroughEncoderFactory {
            slot_capacity: config.encoder.slot_capacity,
            max_pending_output: config.encoder.max_pending_output,
        })),
        #[cfg(feature = "ffmpeg")]
        EncoderBackend::Ffmpeg => {
            let factory = audio_exporter::encoder::FfmpegEncoderFactory::new().map_err(|e| {
                ExportError::encoder(audio_exporter::AudioStage::EncoderInitialization, e)
            })?;
            Ok(Box::new(factory))
        }
        #[cfg(not(feature = "ffmpeg"))]
        EncoderBackend::Ffmpeg => Err(ExportError::Config(
            "ffmpeg backend requested but built without the `ffmpeg` feature".into(),
        )),
    }
}

/// Initialize logging with tracing
fn init_logging(settings: &LoggingSettings) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "audio_exporter={level},audio_export={level}",
            level = settings.level
        )
        .into()
    });

    if settings.format.as_deref() == Some("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let (config, error) = load_config("/nonexistent/audio-export.toml");
        assert_eq!(config.input.sample_rate, 48000);
        assert!(error.is_none());
    }

    #[test]
    fn test_broken_config_returns_error_and_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[input]\nsample_rate = \"fast\"").unwrap();

        let (config, error) = load_config(path.to_str().unwrap());
        assert_eq!(config.input.sample_rate, 48000);
        assert!(matches!(error, Some(ExportError::Config(_))));
    }

    #[test]
    fn test_passthrough_factory_from_config() {
        let config = ExportConfig::default();
        let factory = encoder_factory(&config).unwrap();
        assert!(factory.supports_codec(audio_exporter::AudioCodec::Raw));
    }
}
