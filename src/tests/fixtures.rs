//! Test fixtures for scenario tests
//!
//! Provides a recording encoder whose behaviour can be scripted from the
//! test while the exporter owns it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use bytes::Bytes;

use crate::encoder::{EncodedBuffer, EncoderFactory, FrameEncoder, InputSlot, QueuedInput};
use crate::error::EncoderError;
use crate::exporter::AudioSampleExporter;
use crate::format::{AudioCodec, AudioFormat, MediaFormat, PcmEncoding, TransformationRequest};
use crate::graph::PcmQueueSource;
use crate::sink::MemorySink;

/// Mono 16-bit PCM at 1 kHz: 2 bytes per frame, 500 us per byte pair
pub fn mono_s16_1khz() -> AudioFormat {
    AudioFormat::new(1_000, 1, PcmEncoding::S16Le)
}

pub fn stereo_s16_48k() -> AudioFormat {
    AudioFormat::new(48_000, 2, PcmEncoding::S16Le)
}

/// `len` bytes counting up from 0
pub fn ramp(len: usize) -> Bytes {
    (0..len).map(|i| i as u8).collect::<Vec<u8>>().into()
}

/// Everything the recording encoder saw
#[derive(Debug, Default)]
pub struct EncoderLog {
    pub submissions: Vec<QueuedInput>,
    pub dequeue_calls: usize,
    pub output_releases: Vec<bool>,
    pub release_calls: usize,
}

/// Test-side handle on a [`RecordingEncoder`] owned by an exporter
#[derive(Debug, Clone, Default)]
pub struct EncoderHandle {
    pub log: Rc<RefCell<EncoderLog>>,
    /// When false, no input slot is handed out
    pub slot_available: Rc<Cell<bool>>,
    /// When true, the next queued input fails
    pub fail_queue: Rc<Cell<bool>>,
}

impl EncoderHandle {
    pub fn new() -> Self {
        let handle = Self::default();
        handle.slot_available.set(true);
        handle
    }

    pub fn submission_sizes(&self) -> Vec<usize> {
        self.log
            .borrow()
            .submissions
            .iter()
            .map(|s| s.data.len())
            .collect()
    }

    pub fn submission_times(&self) -> Vec<i64> {
        self.log
            .borrow()
            .submissions
            .iter()
            .map(|s| s.time_us)
            .collect()
    }

    pub fn dequeue_calls(&self) -> usize {
        self.log.borrow().dequeue_calls
    }
}

/// Encoder mirroring input to output and recording every call
pub struct RecordingEncoder {
    handle: EncoderHandle,
    configuration: MediaFormat,
    capacity: usize,
    dirty_slot: bool,
    output: VecDeque<EncodedBuffer>,
    input_ended: bool,
}

impl FrameEncoder for RecordingEncoder {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn configuration_format(&self) -> &MediaFormat {
        &self.configuration
    }

    fn maybe_dequeue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<bool, EncoderError> {
        self.handle.log.borrow_mut().dequeue_calls += 1;
        if !self.handle.slot_available.get() {
            return Ok(false);
        }
        slot.loan(self.capacity);
        if self.dirty_slot {
            slot.fill_from(b"stale");
        }
        Ok(true)
    }

    fn queue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<(), EncoderError> {
        if self.handle.fail_queue.get() {
            return Err(EncoderError::QueueInput("scripted failure".into()));
        }
        if self.input_ended {
            return Err(EncoderError::InvalidState("input queued after end of stream"));
        }
        let input = slot
            .take()
            .ok_or(EncoderError::InvalidState("no input buffer dequeued"))?;
        if input.is_end_of_stream() {
            self.input_ended = true;
        } else {
            self.output.push_back(EncodedBuffer {
                data: input.data.clone(),
                time_us: input.time_us,
            });
        }
        self.handle.log.borrow_mut().submissions.push(input);
        Ok(())
    }

    fn output_format(&mut self) -> Result<Option<MediaFormat>, EncoderError> {
        let seen_input = !self.handle.log.borrow().submissions.is_empty();
        Ok(seen_input.then(|| self.configuration.clone()))
    }

    fn output_buffer(&mut self) -> Result<Option<EncodedBuffer>, EncoderError> {
        Ok(self.output.front().cloned())
    }

    fn release_output_buffer(&mut self, render: bool) -> Result<(), EncoderError> {
        self.handle.log.borrow_mut().output_releases.push(render);
        self.output.pop_front();
        Ok(())
    }

    fn is_ended(&self) -> bool {
        self.input_ended && self.output.is_empty()
    }

    fn release(&mut self) {
        self.handle.log.borrow_mut().release_calls += 1;
    }
}

/// Factory for [`RecordingEncoder`]s sharing one [`EncoderHandle`]
pub struct RecordingEncoderFactory {
    pub handle: EncoderHandle,
    pub capacity: usize,
    pub supported: Vec<AudioCodec>,
    /// Codec the encoder silently ends up with, if different
    pub actual_codec: Option<AudioCodec>,
    pub dirty_slot: bool,
    pub fail_create: bool,
    pub requested: RefCell<Vec<MediaFormat>>,
}

impl RecordingEncoderFactory {
    pub fn new(capacity: usize) -> Self {
        Self {
            handle: EncoderHandle::new(),
            capacity,
            supported: vec![AudioCodec::Aac, AudioCodec::Raw],
            actual_codec: None,
            dirty_slot: false,
            fail_create: false,
            requested: RefCell::new(Vec::new()),
        }
    }
}

impl EncoderFactory for RecordingEncoderFactory {
    fn create_for_audio_encoding(
        &self,
        format: &MediaFormat,
    ) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        self.requested.borrow_mut().push(format.clone());
        if self.fail_create {
            return Err(EncoderError::Configure("scripted failure".into()));
        }
        let codec = self.actual_codec.unwrap_or(format.codec);
        Ok(Box::new(RecordingEncoder {
            handle: self.handle.clone(),
            configuration: format.clone().with_codec(codec),
            capacity: self.capacity,
            dirty_slot: self.dirty_slot,
            output: VecDeque::new(),
            input_ended: false,
        }))
    }

    fn supports_codec(&self, codec: AudioCodec) -> bool {
        self.supported.contains(&codec)
    }
}

/// Exporter over a [`PcmQueueSource`] plus every finalized request it
/// reported
pub fn build_exporter(
    factory: &RecordingEncoderFactory,
    format: AudioFormat,
    request: &TransformationRequest,
) -> (AudioSampleExporter<PcmQueueSource>, Vec<TransformationRequest>) {
    let sink = MemorySink::new(vec![AudioCodec::Aac, AudioCodec::Raw]);
    let mut finalized = Vec::new();
    let mut listener = |request: TransformationRequest| finalized.push(request);
    let exporter = AudioSampleExporter::new(
        AudioCodec::Aac,
        format,
        request,
        PcmQueueSource::new,
        factory,
        &sink,
        &mut listener,
    )
    .unwrap();
    (exporter, finalized)
}
