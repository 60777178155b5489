//! Audio export stage
//!
//! Pulls processed PCM from an [`AudioSource`], cuts it into encoder input
//! slots stamped with byte-derived timestamps, and exposes the encoder's
//! output through [`SampleExporter`].

use uuid::Uuid;

use super::{ProcessOutcome, SampleExporter};
use crate::encoder::{BufferFlags, EncoderFactory, FrameEncoder, InputSlot};
use crate::error::{AudioStage, EncoderError, ExportError, Result, UnhandledAudioFormat};
use crate::fallback::{create_fallback_transformation_request, find_supported_codec, FallbackListener};
use crate::format::{
    AudioCodec, AudioFormat, MediaFormat, TransformationRequest, DEFAULT_ENCODER_BITRATE,
};
use crate::graph::AudioSource;
use crate::sink::{EncodedSample, MuxerSink};
use crate::timing::InputByteCounter;

/// Single-track audio stage between an audio graph and an encoder
pub struct AudioSampleExporter<S: AudioSource> {
    session_id: Uuid,
    source: S,
    encoder: Box<dyn FrameEncoder>,
    encoder_input_format: AudioFormat,
    input_slot: InputSlot,
    input_bytes: InputByteCounter,
    input_ended: bool,
    released: bool,
}

impl<S: AudioSource> AudioSampleExporter<S> {
    /// Build the audio graph and the encoder.
    ///
    /// `asset_codec` is the codec of the asset being exported and is kept
    /// unless `request` names another one. `build_graph` creates the audio
    /// graph for PCM in `input_format`. The finalized request is reported to
    /// `fallback_listener` before this returns.
    pub fn new<G, M>(
        asset_codec: AudioCodec,
        input_format: AudioFormat,
        request: &TransformationRequest,
        build_graph: G,
        encoder_factory: &dyn EncoderFactory,
        sink: &M,
        fallback_listener: &mut dyn FallbackListener,
    ) -> Result<Self>
    where
        G: FnOnce(AudioFormat) -> std::result::Result<S, UnhandledAudioFormat>,
        M: MuxerSink + ?Sized,
    {
        let session_id = Uuid::new_v4();

        let mut source = build_graph(input_format).map_err(|source| ExportError::AudioGraph {
            stage: AudioStage::GraphInitialization,
            source,
        })?;

        let encoder_input_format = source.output_format();
        if !encoder_input_format.is_valid() {
            source.release();
            return Err(ExportError::AudioGraph {
                stage: AudioStage::GraphInitialization,
                source: UnhandledAudioFormat::new(
                    encoder_input_format,
                    "audio graph output format is not set",
                ),
            });
        }

        let requested_format = MediaFormat::for_audio(
            request.audio_codec.unwrap_or(asset_codec),
            &encoder_input_format,
        )
        .with_average_bitrate(request.average_bitrate.unwrap_or(DEFAULT_ENCODER_BITRATE));

        let encoder = find_supported_codec(
            &requested_format,
            &sink.supported_codecs(),
            encoder_factory,
        )
        .and_then(|codec| {
            encoder_factory
                .create_for_audio_encoding(&requested_format.clone().with_codec(codec))
                .map_err(|e| ExportError::encoder(AudioStage::EncoderInitialization, e))
        });
        let encoder = match encoder {
            Ok(encoder) => encoder,
            Err(e) => {
                source.release();
                return Err(e);
            }
        };

        let finalized = create_fallback_transformation_request(
            request,
            &requested_format,
            encoder.configuration_format(),
        );

        tracing::debug!(
            session = %session_id,
            encoder = encoder.name(),
            input = %encoder_input_format,
            requested = %requested_format.codec,
            actual = %encoder.configuration_format().codec,
            "audio exporter: created"
        );

        fallback_listener.on_transformation_request_finalized(finalized);

        Ok(Self {
            session_id,
            source,
            encoder,
            encoder_input_format,
            input_slot: InputSlot::new(),
            input_bytes: InputByteCounter::new(),
            input_ended: false,
            released: false,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// PCM format handed to the encoder.
    pub fn encoder_input_format(&self) -> AudioFormat {
        self.encoder_input_format
    }

    /// Format the encoder was configured with.
    pub fn encoder_format(&self) -> &MediaFormat {
        self.encoder.configuration_format()
    }

    /// Bytes accepted by the encoder so far.
    pub fn total_input_bytes(&self) -> u64 {
        self.input_bytes.total()
    }

    /// Whether the end-of-stream marker has been submitted.
    pub fn is_input_ended(&self) -> bool {
        self.input_ended
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Mutable access to the audio graph, e.g. to queue more input.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    fn check_not_released(&self) -> Result<()> {
        if self.released {
            return Err(ExportError::Released);
        }
        Ok(())
    }

    fn output_duration_us(&self) -> i64 {
        self.input_bytes.duration_us(&self.encoder_input_format)
    }

    /// Copy as much of the current window as fits into the input slot,
    /// advance the window and submit the slot.
    fn feed_encoder(&mut self) -> Result<()> {
        let window = self.source.pull_output();
        let copied = self.input_slot.fill_from(window.remaining());
        window.advance(copied);
        self.input_bytes.add(copied)?;

        self.input_slot.time_us = self.output_duration_us();
        self.input_slot.flags = BufferFlags::empty();
        tracing::trace!(
            session = %self.session_id,
            bytes = copied,
            time_us = self.input_slot.time_us,
            "audio exporter: queueing input"
        );
        self.encoder
            .queue_input_buffer(&mut self.input_slot)
            .map_err(|e| ExportError::encoder(AudioStage::EncoderInput, e))
    }

    fn queue_end_of_stream(&mut self) -> Result<()> {
        // end of stream is only ever queued with an empty buffer
        assert!(
            self.input_slot.is_empty(),
            "end of stream queued with {} bytes in the input slot",
            self.input_slot.len()
        );
        self.input_slot.time_us = self.output_duration_us();
        self.input_slot.flags.insert(BufferFlags::END_OF_STREAM);
        self.encoder
            .queue_input_buffer(&mut self.input_slot)
            .map_err(|e| ExportError::encoder(AudioStage::EncoderInput, e))?;
        self.input_ended = true;

        tracing::debug!(
            session = %self.session_id,
            total_bytes = self.input_bytes.total(),
            time_us = self.input_slot.time_us,
            "audio exporter: end of stream queued"
        );
        Ok(())
    }
}

impl<S: AudioSource> SampleExporter for AudioSampleExporter<S> {
    fn process_input_step(&mut self) -> Result<ProcessOutcome> {
        self.check_not_released()?;
        if self.input_ended {
            return Ok(ProcessOutcome::Ended);
        }

        // Returns the same window until consumed; only an unfinished source
        // with nothing to read leaves the encoder untouched.
        let has_data = self.source.pull_output().has_remaining();
        if !has_data && !self.source.is_ended() {
            return Ok(ProcessOutcome::NoProgress);
        }

        if !self.input_slot.is_checked_out()
            && !self
                .encoder
                .maybe_dequeue_input_buffer(&mut self.input_slot)
                .map_err(|e| ExportError::encoder(AudioStage::EncoderInput, e))?
        {
            return Ok(ProcessOutcome::NoProgress);
        }

        if self.source.is_ended() {
            self.queue_end_of_stream()?;
            return Ok(ProcessOutcome::Ended);
        }

        if self.input_slot.capacity() == 0 {
            return Err(ExportError::encoder(
                AudioStage::EncoderInput,
                EncoderError::InvalidState("input slot loaned without capacity"),
            ));
        }
        self.feed_encoder()?;
        Ok(ProcessOutcome::Progress)
    }

    fn output_format(&mut self) -> Result<Option<MediaFormat>> {
        self.check_not_released()?;
        self.encoder
            .output_format()
            .map_err(|e| ExportError::encoder(AudioStage::EncoderOutput, e))
    }

    fn output_buffer(&mut self) -> Result<Option<EncodedSample>> {
        self.check_not_released()?;
        let buffer = self
            .encoder
            .output_buffer()
            .map_err(|e| ExportError::encoder(AudioStage::EncoderOutput, e))?;
        // every audio access unit decodes on its own
        Ok(buffer.map(|buffer| EncodedSample {
            data: buffer.data,
            time_us: buffer.time_us,
            key_frame: true,
        }))
    }

    fn release_output_buffer(&mut self) -> Result<()> {
        self.check_not_released()?;
        self.encoder
            .release_output_buffer(false)
            .map_err(|e| ExportError::encoder(AudioStage::EncoderOutput, e))
    }

    fn is_output_ended(&self) -> bool {
        !self.released && self.encoder.is_ended()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.source.release();
        self.encoder.release();
        self.released = true;
        tracing::debug!(session = %self.session_id, "audio exporter: released");
    }
}

impl<S: AudioSource> Drop for AudioSampleExporter<S> {
    fn drop(&mut self) {
        self.release();
    }
}
