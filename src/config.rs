//! Export configuration
//!
//! Loads export settings from TOML files. Every section is optional and
//! falls back to its defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::encoder::passthrough::{DEFAULT_MAX_PENDING_OUTPUT, DEFAULT_SLOT_CAPACITY};
use crate::error::{ExportError, Result};
use crate::format::{AudioCodec, AudioFormat, PcmEncoding, TransformationRequest};

/// Raw PCM input settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSettings {
    /// Sample rate of the input PCM in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Sample encoding
    pub encoding: PcmEncoding,
    /// Codec of the asset the PCM was decoded from
    pub asset_codec: AudioCodec,
    /// Size of the chunks the input is queued in
    pub read_chunk_bytes: usize,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            encoding: PcmEncoding::S16Le,
            asset_codec: AudioCodec::Aac,
            read_chunk_bytes: 16 * 1024,
        }
    }
}

impl InputSettings {
    pub fn audio_format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_rate, self.channels, self.encoding)
    }
}

/// Which encoder implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderBackend {
    /// Raw PCM access units
    Passthrough,
    /// AAC through FFmpeg (needs the `ffmpeg` feature)
    Ffmpeg,
}

/// Encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub backend: EncoderBackend,
    /// Input buffer size of the passthrough encoder in bytes
    pub slot_capacity: usize,
    /// Access units the passthrough encoder holds before refusing input
    pub max_pending_output: usize,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            backend: EncoderBackend::Passthrough,
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            max_pending_output: DEFAULT_MAX_PENDING_OUTPUT,
        }
    }
}

/// Muxer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Codecs the output container accepts, in order of preference
    pub supported_codecs: Vec<AudioCodec>,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            supported_codecs: vec![AudioCodec::Aac, AudioCodec::Raw],
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Some("pretty".to_string()),
        }
    }
}

/// Export configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub input: InputSettings,
    pub request: TransformationRequest,
    pub encoder: EncoderSettings,
    pub sink: SinkSettings,
    pub logging: LoggingSettings,
}

impl ExportConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ExportError::Config(format!("invalid config: {}", e)))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ExportError::Config(format!("cannot serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Check values that would make the export impossible.
    pub fn validate(&self) -> Result<()> {
        if !self.input.audio_format().is_valid() {
            return Err(ExportError::Config(
                "input sample_rate and channels must be non-zero".into(),
            ));
        }
        if self.input.read_chunk_bytes == 0 {
            return Err(ExportError::Config(
                "input read_chunk_bytes must be non-zero".into(),
            ));
        }
        if self.encoder.slot_capacity == 0 {
            return Err(ExportError::Config(
                "encoder slot_capacity must be non-zero".into(),
            ));
        }
        if self.sink.supported_codecs.is_empty() {
            return Err(ExportError::Config(
                "sink supported_codecs must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Generate default configuration file at the specified path
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ExportConfig::default().to_file(path)
}
