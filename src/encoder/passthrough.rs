//! Raw PCM passthrough encoder
//!
//! Every queued input buffer becomes one output access unit with the same
//! bytes and timestamp. Used when the sink accepts uncompressed audio, and
//! as a deterministic encoder in tests.

use std::collections::VecDeque;

use super::{EncodedBuffer, EncoderFactory, FrameEncoder, InputSlot};
use crate::error::EncoderError;
use crate::format::{AudioCodec, MediaFormat};

/// Default input buffer size in bytes
pub const DEFAULT_SLOT_CAPACITY: usize = 4096;
/// Default number of access units that may wait for the sink
pub const DEFAULT_MAX_PENDING_OUTPUT: usize = 4;

/// Encoder emitting [`AudioCodec::Raw`] access units
#[derive(Debug)]
pub struct PassthroughEncoder {
    configuration: MediaFormat,
    slot_capacity: usize,
    max_pending_output: usize,
    output: VecDeque<EncodedBuffer>,
    output_format_known: bool,
    input_ended: bool,
    released: bool,
}

impl PassthroughEncoder {
    /// Create an encoder for `format`. The configured codec is always
    /// [`AudioCodec::Raw`], whatever `format` asks for.
    pub fn new(format: &MediaFormat, slot_capacity: usize, max_pending_output: usize) -> Self {
        Self {
            configuration: format.clone().with_codec(AudioCodec::Raw),
            slot_capacity: slot_capacity.max(1),
            max_pending_output: max_pending_output.max(1),
            output: VecDeque::new(),
            output_format_known: false,
            input_ended: false,
            released: false,
        }
    }

    /// Access units waiting to be pulled.
    pub fn pending_output(&self) -> usize {
        self.output.len()
    }

    fn check_not_released(&self) -> Result<(), EncoderError> {
        if self.released {
            return Err(EncoderError::InvalidState("encoder released"));
        }
        Ok(())
    }
}

impl FrameEncoder for PassthroughEncoder {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn configuration_format(&self) -> &MediaFormat {
        &self.configuration
    }

    fn maybe_dequeue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<bool, EncoderError> {
        self.check_not_released()?;
        if self.input_ended || self.output.len() >= self.max_pending_output {
            return Ok(false);
        }
        slot.loan(self.slot_capacity);
        Ok(true)
    }

    fn queue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<(), EncoderError> {
        self.check_not_released()?;
        if self.input_ended {
            return Err(EncoderError::InvalidState(
                "input queued after end of stream",
            ));
        }
        let input = slot
            .take()
            .ok_or(EncoderError::InvalidState("no input buffer dequeued"))?;

        self.output_format_known = true;
        let end_of_stream = input.is_end_of_stream();
        if !input.data.is_empty() {
            self.output.push_back(EncodedBuffer {
                data: input.data,
                time_us: input.time_us,
            });
        }
        if end_of_stream {
            tracing::debug!(time_us = input.time_us, "passthrough: end of stream queued");
            self.input_ended = true;
        }
        Ok(())
    }

    fn output_format(&mut self) -> Result<Option<MediaFormat>, EncoderError> {
        self.check_not_released()?;
        Ok(self
            .output_format_known
            .then(|| self.configuration.clone()))
    }

    fn output_buffer(&mut self) -> Result<Option<EncodedBuffer>, EncoderError> {
        self.check_not_released()?;
        Ok(self.output.front().cloned())
    }

    fn release_output_buffer(&mut self, _render: bool) -> Result<(), EncoderError> {
        self.check_not_released()?;
        self.output
            .pop_front()
            .map(|_| ())
            .ok_or_else(|| EncoderError::DequeueOutput("no output buffer to release".into()))
    }

    fn is_ended(&self) -> bool {
        self.input_ended && self.output.is_empty()
    }

    fn release(&mut self) {
        self.output.clear();
        self.released = true;
    }
}

/// Factory for [`PassthroughEncoder`]
#[derive(Debug, Clone)]
pub struct PassthroughEncoderFactory {
    pub slot_capacity: usize,
    pub max_pending_output: usize,
}

impl Default for PassthroughEncoderFactory {
    fn default() -> Self {
        Self {
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            max_pending_output: DEFAULT_MAX_PENDING_OUTPUT,
        }
    }
}

impl EncoderFactory for PassthroughEncoderFactory {
    fn create_for_audio_encoding(
        &self,
        format: &MediaFormat,
    ) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        if format.sample_rate == 0 || format.channel_count == 0 {
            return Err(EncoderError::Configure(format!(
                "passthrough: incomplete format {:?}",
                format
            )));
        }
        Ok(Box::new(PassthroughEncoder::new(
            format,
            self.slot_capacity,
            self.max_pending_output,
        )))
    }

    fn supports_codec(&self, codec: AudioCodec) -> bool {
        codec == AudioCodec::Raw
    }
}
