//! In-memory sink collecting encoded samples
//!
//! Keeps everything the relay hands over so callers can inspect or write
//! the elementary stream after the export finished.

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use super::{EncodedSample, MuxerSink};
use crate::error::{ExportError, Result};
use crate::format::{AudioCodec, MediaFormat};

/// [`MuxerSink`] that stores samples in memory
#[derive(Debug, Clone)]
pub struct MemorySink {
    supported: Vec<AudioCodec>,
    format: Option<MediaFormat>,
    samples: Vec<EncodedSample>,
    ended: bool,
    /// Refuse samples while this many are stored; `None` is unbounded
    capacity: Option<usize>,
}

/// Totals of a finished export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkSummary {
    pub codec: Option<AudioCodec>,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub samples: usize,
    pub bytes: usize,
    pub first_time_us: Option<i64>,
    pub last_time_us: Option<i64>,
    pub ended: bool,
}

impl MemorySink {
    pub fn new(supported: Vec<AudioCodec>) -> Self {
        Self {
            supported,
            format: None,
            samples: Vec::new(),
            ended: false,
            capacity: None,
        }
    }

    /// Refuse samples once `capacity` are held, until [`MemorySink::take_samples`].
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    pub fn format(&self) -> Option<&MediaFormat> {
        self.format.as_ref()
    }

    pub fn samples(&self) -> &[EncodedSample] {
        &self.samples
    }

    /// Drain the stored samples.
    pub fn take_samples(&mut self) -> Vec<EncodedSample> {
        std::mem::take(&mut self.samples)
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// All sample payloads concatenated in order.
    pub fn elementary_stream(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.samples.iter().map(|s| s.data.len()).sum());
        for sample in &self.samples {
            out.extend_from_slice(&sample.data);
        }
        out.freeze()
    }

    pub fn summary(&self) -> SinkSummary {
        SinkSummary {
            codec: self.format.as_ref().map(|f| f.codec),
            sample_rate: self.format.as_ref().map(|f| f.sample_rate),
            channel_count: self.format.as_ref().map(|f| f.channel_count),
            samples: self.samples.len(),
            bytes: self.samples.iter().map(|s| s.data.len()).sum(),
            first_time_us: self.samples.first().map(|s| s.time_us),
            last_time_us: self.samples.last().map(|s| s.time_us),
            ended: self.ended,
        }
    }
}

impl MuxerSink for MemorySink {
    fn supported_codecs(&self) -> Vec<AudioCodec> {
        self.supported.clone()
    }

    fn on_format_available(&mut self, format: &MediaFormat) -> Result<()> {
        if self.format.is_some() {
            return Err(ExportError::Muxing("track format already set".into()));
        }
        self.format = Some(format.clone());
        Ok(())
    }

    fn on_encoded_buffer(&mut self, sample: &EncodedSample) -> Result<bool> {
        if self.format.is_none() {
            return Err(ExportError::Muxing("sample written before track format".into()));
        }
        if self.ended {
            return Err(ExportError::Muxing("sample written after end of track".into()));
        }
        if self.capacity.is_some_and(|cap| self.samples.len() >= cap) {
            return Ok(false);
        }
        self.samples.push(sample.clone());
        Ok(true)
    }

    fn on_ended(&mut self) -> Result<()> {
        if self.ended {
            return Err(ExportError::Muxing("track ended twice".into()));
        }
        self.ended = true;
        Ok(())
    }
}
