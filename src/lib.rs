//! Audio export stage
//!
//! Moves processed PCM from an audio graph into a block-oriented encoder and
//! relays the encoded access units to a muxer, without ever blocking the
//! calling thread. Timestamps are derived from the number of bytes the
//! encoder has accepted.

pub mod config;
pub mod encoder;
pub mod error;
pub mod exporter;
pub mod fallback;
pub mod format;
pub mod graph;
pub mod sink;
pub mod timing;

#[cfg(test)]
pub(crate) mod tests;

pub use error::{AudioStage, EncoderError, ExportError, Result, UnhandledAudioFormat};
pub use exporter::{AudioSampleExporter, OutputRelay, ProcessOutcome, SampleExporter};
pub use fallback::{FallbackListener, FallbackTracker};
pub use format::{AudioCodec, AudioFormat, MediaFormat, PcmEncoding, TransformationRequest};
