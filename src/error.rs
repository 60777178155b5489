use std::fmt;

use thiserror::Error;

use crate::format::{AudioFormat, PcmEncoding};

/// The part of the audio stage a failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStage {
    /// Building the upstream processing chain for the input format
    GraphInitialization,
    /// Creating and configuring the encoder
    EncoderInitialization,
    /// Acquiring input slots or submitting input to the encoder
    EncoderInput,
    /// Pulling or releasing encoded output
    EncoderOutput,
}

impl fmt::Display for AudioStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioStage::GraphInitialization => "audio graph initialization",
            AudioStage::EncoderInitialization => "audio encoder initialization",
            AudioStage::EncoderInput => "audio encoder input",
            AudioStage::EncoderOutput => "audio encoder output",
        };
        f.write_str(name)
    }
}

/// Main error type for the audio export stage
#[derive(Error, Debug)]
pub enum ExportError {
    /// No output codec is supported by both the sink and the encoder
    #[error("Configuration error: {0}")]
    Config(String),

    /// The upstream audio graph cannot handle the input format
    #[error("Audio processing failed during {stage}: {source}")]
    AudioGraph {
        stage: AudioStage,
        #[source]
        source: UnhandledAudioFormat,
    },

    /// An error reported by the encoder port
    #[error("Audio encoder failed during {stage}: {source}")]
    Encoder {
        stage: AudioStage,
        #[source]
        source: EncoderError,
    },

    /// An error reported by the muxer sink
    #[error("Muxing error: {0}")]
    Muxing(String),

    /// The accumulated input byte count can no longer be represented
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// The stage was invoked after `release()`
    #[error("Audio exporter already released")]
    Released,

    /// A standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Wrap an encoder error with the stage it happened in.
    pub fn encoder(stage: AudioStage, source: EncoderError) -> Self {
        ExportError::Encoder { stage, source }
    }

    /// The audio stage this failure is attributed to, if it came from the
    /// audio path rather than configuration, the sink or I/O.
    pub fn audio_stage(&self) -> Option<AudioStage> {
        match self {
            ExportError::AudioGraph { stage, .. } | ExportError::Encoder { stage, .. } => {
                Some(*stage)
            }
            _ => None,
        }
    }
}

/// Encoder port errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncoderError {
    /// No encoder exists for the requested codec
    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    /// Failure applying configuration parameters to an encoder
    #[error("Failed to configure encoder: {0}")]
    Configure(String),

    /// Failure accepting an input buffer
    #[error("Failed to queue input buffer: {0}")]
    QueueInput(String),

    /// Failure producing or releasing an output buffer
    #[error("Failed to dequeue output buffer: {0}")]
    DequeueOutput(String),

    /// The call is not valid in the encoder's current state
    #[error("Invalid encoder state: {0}")]
    InvalidState(&'static str),
}

/// Raised by an audio graph that cannot process the given input format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unhandled input format {format}: {reason}")]
pub struct UnhandledAudioFormat {
    pub format: AudioFormat,
    pub reason: String,
}

impl UnhandledAudioFormat {
    pub fn new(format: AudioFormat, reason: impl Into<String>) -> Self {
        Self {
            format,
            reason: reason.into(),
        }
    }

    /// Shorthand for an encoding the graph has no conversion for.
    pub fn unsupported_encoding(format: AudioFormat, encoding: PcmEncoding) -> Self {
        Self::new(format, format!("unsupported PCM encoding {:?}", encoding))
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ExportError>;
