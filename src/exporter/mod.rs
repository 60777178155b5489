//! Export stages
//!
//! This module handles the stage side of an export:
//! - The capability set every stage implements (`SampleExporter`)
//! - Relaying encoded output to the muxer sink (`OutputRelay`)
//! - The audio stage itself (`audio::AudioSampleExporter`)

pub mod audio;

pub use audio::AudioSampleExporter;

use crate::error::Result;
use crate::format::MediaFormat;
use crate::sink::{EncodedSample, MuxerSink};

/// Result of one non-blocking step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Work was done; call again right away
    Progress,
    /// Nothing could be done now (backpressure or no data yet)
    NoProgress,
    /// This side of the stage is finished; no more calls are needed
    Ended,
}

/// Operations shared by export stages
pub trait SampleExporter {
    /// Move input towards the encoder by at most one bounded step.
    fn process_input_step(&mut self) -> Result<ProcessOutcome>;

    /// Format of the encoded output, once known.
    fn output_format(&mut self) -> Result<Option<MediaFormat>>;

    /// Next encoded sample, if one is ready. Returns the same sample until
    /// [`SampleExporter::release_output_buffer`] is called.
    fn output_buffer(&mut self) -> Result<Option<EncodedSample>>;

    /// Give the current sample back to the encoder.
    fn release_output_buffer(&mut self) -> Result<()>;

    /// Whether the encoder has emitted everything.
    fn is_output_ended(&self) -> bool;

    /// Release source and encoder. Safe to call at any time and repeatedly.
    fn release(&mut self);
}

/// Moves encoded samples from a stage into a [`MuxerSink`]
#[derive(Debug)]
pub struct OutputRelay<M> {
    sink: M,
    format_sent: bool,
    ended_sent: bool,
    samples_written: u64,
}

impl<M: MuxerSink> OutputRelay<M> {
    pub fn new(sink: M) -> Self {
        Self {
            sink,
            format_sent: false,
            ended_sent: false,
            samples_written: 0,
        }
    }

    pub fn sink(&self) -> &M {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut M {
        &mut self.sink
    }

    pub fn into_sink(self) -> M {
        self.sink
    }

    /// Whether the sink has been told the track ended.
    pub fn is_ended(&self) -> bool {
        self.ended_sent
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// Hand at most one sample from `stage` to the sink.
    ///
    /// Returns `true` when a sample was written and released.
    pub fn feed<S: SampleExporter + ?Sized>(&mut self, stage: &mut S) -> Result<bool> {
        if self.ended_sent {
            return Ok(false);
        }

        if !self.format_sent {
            let Some(format) = stage.output_format()? else {
                if stage.is_output_ended() {
                    // drained without ever producing output
                    tracing::warn!("relay: output ended before a format was available");
                    self.sink.on_ended()?;
                    self.ended_sent = true;
                }
                return Ok(false);
            };
            tracing::debug!(
                codec = %format.codec,
                sample_rate = format.sample_rate,
                channels = format.channel_count,
                "relay: output format available"
            );
            self.sink.on_format_available(&format)?;
            self.format_sent = true;
        }

        if stage.is_output_ended() {
            tracing::debug!(samples = self.samples_written, "relay: output ended");
            self.sink.on_ended()?;
            self.ended_sent = true;
            return Ok(false);
        }

        let Some(sample) = stage.output_buffer()? else {
            return Ok(false);
        };
        if !self.sink.on_encoded_buffer(&sample)? {
            // sink not ready, offer the same sample next time
            return Ok(false);
        }
        tracing::trace!(
            time_us = sample.time_us,
            bytes = sample.data.len(),
            "relay: sample written"
        );
        stage.release_output_buffer()?;
        self.samples_written += 1;
        Ok(true)
    }

    /// One scheduling step for `stage`: relay output first, otherwise push
    /// input. `Progress` is only reported when a sample was handed over or
    /// input reached the encoder.
    pub fn process_data<S: SampleExporter + ?Sized>(
        &mut self,
        stage: &mut S,
    ) -> Result<ProcessOutcome> {
        if self.feed(stage)? {
            return Ok(ProcessOutcome::Progress);
        }
        if self.ended_sent {
            return Ok(ProcessOutcome::Ended);
        }
        match stage.process_input_step()? {
            ProcessOutcome::Progress => Ok(ProcessOutcome::Progress),
            ProcessOutcome::NoProgress | ProcessOutcome::Ended => Ok(ProcessOutcome::NoProgress),
        }
    }
}
