//! Encoder port
//!
//! This module defines the block-oriented encoder the exporter drives:
//! - Input slots loaned by the encoder and filled by the exporter
//! - Output buffers pulled one at a time and released explicitly
//! - Encoder factories used during format negotiation
//!
//! Implementations:
//! - `passthrough`: raw PCM access units, no compression
//! - `ffmpeg_aac`: AAC-LC through FFmpeg (feature `ffmpeg`)

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_aac;
pub mod passthrough;

#[cfg(feature = "ffmpeg")]
pub use ffmpeg_aac::{FfmpegAacEncoder, FfmpegEncoderFactory};
pub use passthrough::{PassthroughEncoder, PassthroughEncoderFactory};

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};

use crate::error::EncoderError;
use crate::format::{AudioCodec, MediaFormat};

bitflags! {
    /// Flag bits carried by input submissions
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferFlags: u32 {
        /// Last submission of the stream; carries no data
        const END_OF_STREAM = 1 << 2;
    }
}

impl Default for BufferFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Input buffer staged by the exporter and handed to the encoder.
///
/// The slot is reused for the whole session. Its storage is loaned by the
/// encoder in [`FrameEncoder::maybe_dequeue_input_buffer`] and taken back in
/// [`FrameEncoder::queue_input_buffer`].
#[derive(Debug, Default)]
pub struct InputSlot {
    data: Option<BytesMut>,
    capacity: usize,
    /// Presentation time of the first frame in the slot
    pub time_us: i64,
    pub flags: BufferFlags,
}

impl InputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand `capacity` bytes of empty storage to the slot. Called by
    /// encoders.
    pub fn loan(&mut self, capacity: usize) {
        let mut storage = self.data.take().unwrap_or_default();
        storage.clear();
        storage.reserve(capacity);
        self.data = Some(storage);
        self.capacity = capacity;
        self.time_us = 0;
        self.flags = BufferFlags::empty();
    }

    /// Whether storage is currently loaned and not yet submitted.
    pub fn is_checked_out(&self) -> bool {
        self.data.is_some()
    }

    /// Capacity of the loaned storage; 0 when nothing is checked out.
    pub fn capacity(&self) -> usize {
        if self.is_checked_out() {
            self.capacity
        } else {
            0
        }
    }

    /// Bytes written into the slot so far.
    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, BytesMut::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Room left before the slot is full.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }

    /// Copy as much of `src` as fits and return the number of bytes copied.
    pub fn fill_from(&mut self, src: &[u8]) -> usize {
        let count = src.len().min(self.remaining_capacity());
        if let Some(data) = self.data.as_mut() {
            data.extend_from_slice(&src[..count]);
        }
        count
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }

    /// Take the submitted contents back. Called by encoders when input is
    /// queued; the slot is no longer checked out afterwards.
    pub fn take(&mut self) -> Option<QueuedInput> {
        let data = self.data.take()?;
        Some(QueuedInput {
            data: data.freeze(),
            time_us: self.time_us,
            flags: self.flags,
        })
    }
}

/// Contents of a submitted input slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedInput {
    pub data: Bytes,
    pub time_us: i64,
    pub flags: BufferFlags,
}

impl QueuedInput {
    pub fn is_end_of_stream(&self) -> bool {
        self.flags.contains(BufferFlags::END_OF_STREAM)
    }
}

/// One encoded access unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer {
    pub data: Bytes,
    pub time_us: i64,
}

/// Block-oriented audio encoder
pub trait FrameEncoder {
    /// Encoder name (for logging/debugging)
    fn name(&self) -> &'static str;

    /// Format the encoder was actually configured with. May differ from the
    /// format it was created for.
    fn configuration_format(&self) -> &MediaFormat;

    /// Loan an empty input buffer to `slot`.
    ///
    /// Returns `Ok(false)` when every input buffer is in use; that is
    /// backpressure, not an error.
    fn maybe_dequeue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<bool, EncoderError>;

    /// Submit the contents of a checked-out `slot`.
    fn queue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<(), EncoderError>;

    /// Output format, once the encoder knows it.
    fn output_format(&mut self) -> Result<Option<MediaFormat>, EncoderError>;

    /// Next encoded buffer, if one is ready. Returns the same buffer until it
    /// is released.
    fn output_buffer(&mut self) -> Result<Option<EncodedBuffer>, EncoderError>;

    /// Give the current output buffer back to the encoder.
    fn release_output_buffer(&mut self, render: bool) -> Result<(), EncoderError>;

    /// Whether the encoder has output everything after end of stream.
    fn is_ended(&self) -> bool;

    /// Release the encoder. Must be idempotent.
    fn release(&mut self);
}

/// Creates encoders during format negotiation
pub trait EncoderFactory {
    /// Create an encoder for `format`.
    ///
    /// The encoder may be configured with a different format than requested
    /// (e.g. another codec) when the requested one is unavailable; callers
    /// read the outcome from [`FrameEncoder::configuration_format`].
    fn create_for_audio_encoding(
        &self,
        format: &MediaFormat,
    ) -> Result<Box<dyn FrameEncoder>, EncoderError>;

    /// Whether this factory has an encoder for `codec`.
    fn supports_codec(&self, codec: AudioCodec) -> bool {
        let _ = codec;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_not_checked_out_by_default() {
        let slot = InputSlot::new();
        assert!(!slot.is_checked_out());
        assert_eq!(slot.capacity(), 0);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_slot_fill_respects_capacity() {
        let mut slot = InputSlot::new();
        slot.loan(4);
        assert_eq!(slot.fill_from(b"abcdef"), 4);
        assert_eq!(slot.len(), 4);
        assert_eq!(slot.remaining_capacity(), 0);
        assert_eq!(slot.fill_from(b"gh"), 0);
    }

    #[test]
    fn test_slot_take_returns_contents() {
        let mut slot = InputSlot::new();
        slot.loan(8);
        slot.fill_from(b"abc");
        slot.time_us = 42;
        slot.flags.insert(BufferFlags::END_OF_STREAM);

        let queued = slot.take().unwrap();
        assert_eq!(&queued.data[..], b"abc");
        assert_eq!(queued.time_us, 42);
        assert!(queued.is_end_of_stream());
        assert!(!slot.is_checked_out());
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_loan_resets_slot() {
        let mut slot = InputSlot::new();
        slot.loan(4);
        slot.fill_from(b"ab");
        slot.flags.insert(BufferFlags::END_OF_STREAM);
        slot.loan(2);
        assert!(slot.is_empty());
        assert!(!slot.is_end_of_stream());
        assert_eq!(slot.capacity(), 2);
    }

    #[test]
    fn test_flags() {
        let mut flags = BufferFlags::empty();
        assert!(!flags.contains(BufferFlags::END_OF_STREAM));
        flags.insert(BufferFlags::END_OF_STREAM);
        assert!(flags.contains(BufferFlags::END_OF_STREAM));
        assert_eq!(flags.bits(), 4);
    }
}
