//! Muxer sink port
//!
//! The sink receives, in order:
//! - The finalized output format, once
//! - Encoded access units with timestamps and key-frame flags
//! - An end-of-track signal, once

pub mod memory;

pub use memory::MemorySink;

use bytes::Bytes;

use crate::error::Result;
use crate::format::{AudioCodec, MediaFormat};

/// One encoded access unit as handed to the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedSample {
    pub data: Bytes,
    pub time_us: i64,
    pub key_frame: bool,
}

/// Consumer of encoded audio, typically a container writer
pub trait MuxerSink {
    /// Codecs the container can carry, in order of preference.
    fn supported_codecs(&self) -> Vec<AudioCodec>;

    /// Called once, before the first sample.
    fn on_format_available(&mut self, format: &MediaFormat) -> Result<()>;

    /// Take one sample.
    ///
    /// Returns `Ok(false)` when the sink cannot take the sample yet; the
    /// same sample is offered again on a later call.
    fn on_encoded_buffer(&mut self, sample: &EncodedSample) -> Result<bool>;

    /// Called once, after the last sample.
    fn on_ended(&mut self) -> Result<()>;
}

impl<T: MuxerSink + ?Sized> MuxerSink for Box<T> {
    fn supported_codecs(&self) -> Vec<AudioCodec> {
        (**self).supported_codecs()
    }

    fn on_format_available(&mut self, format: &MediaFormat) -> Result<()> {
        (**self).on_format_available(format)
    }

    fn on_encoded_buffer(&mut self, sample: &EncodedSample) -> Result<bool> {
        (**self).on_encoded_buffer(sample)
    }

    fn on_ended(&mut self) -> Result<()> {
        (**self).on_ended()
    }
}
