//! AAC encoder backed by FFmpeg
//!
//! Wraps an FFmpeg `AVCodecContext` behind the [`FrameEncoder`] port.
//! Interleaved PCM (S16LE or F32LE) from the input slots is collected into
//! whole AAC frames, converted to planar float and encoded to AAC-LC.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::util::channel_layout::ChannelLayout;
use ffmpeg_next::util::format::sample::Sample;

use super::{EncodedBuffer, EncoderFactory, FrameEncoder, InputSlot};
use crate::error::EncoderError;
use crate::format::{AudioCodec, AudioFormat, MediaFormat, PcmEncoding};
use crate::timing::MICROS_PER_SECOND;

/// Sample format the AAC encoder consumes
pub const ENCODER_SAMPLE_FMT: Sample = Sample::F32(ffmpeg::util::format::sample::Type::Planar);
/// AAC encoder frame size (number of samples per channel per frame)
pub const AAC_FRAME_SIZE: usize = 1024;
/// Encoded packets that may wait for the sink before input is refused
const MAX_PENDING_OUTPUT: usize = 8;

/// AAC encoder backed by a real FFmpeg codec context
pub struct FfmpegAacEncoder {
    encoder: ffmpeg::encoder::Audio,
    configuration: MediaFormat,
    input_format: AudioFormat,
    layout: ChannelLayout,
    frame_size: usize,
    pending: BytesMut,
    samples_sent: i64,
    output: VecDeque<EncodedBuffer>,
    output_format_known: bool,
    input_ended: bool,
    eof_reached: bool,
    released: bool,
}

impl FfmpegAacEncoder {
    /// Open an AAC encoder for interleaved PCM described by `format`.
    pub fn open(format: &MediaFormat) -> Result<Self, EncoderError> {
        let encoding = format.pcm_encoding.unwrap_or(PcmEncoding::S16Le);
        if !matches!(encoding, PcmEncoding::S16Le | PcmEncoding::F32Le) {
            return Err(EncoderError::Configure(format!(
                "AAC encoder cannot take {:?} input",
                encoding
            )));
        }
        let layout = match format.channel_count {
            1 => ChannelLayout::MONO,
            2 => ChannelLayout::STEREO,
            n => {
                return Err(EncoderError::Configure(format!(
                    "AAC encoder supports mono or stereo input, got {} channels",
                    n
                )))
            }
        };
        let input_format = AudioFormat::new(format.sample_rate, format.channel_count, encoding);
        let bitrate = format
            .average_bitrate
            .map(u64::from)
            .unwrap_or_else(|| get_recommended_bitrate(format.channel_count));

        let aac = codec::encoder::find(codec::Id::AAC).ok_or_else(|| {
            EncoderError::EncoderNotFound("AAC encoder not found in this FFmpeg build".into())
        })?;

        // Build context and configure the audio encoder BEFORE opening
        let mut context = codec::Context::new_with_codec(aac);
        context.set_time_base(ffmpeg::Rational::new(1, format.sample_rate as i32));

        let mut audio_enc = context.encoder().audio().map_err(|e| {
            EncoderError::Configure(format!("Cannot get audio encoder handle: {}", e))
        })?;

        audio_enc.set_rate(format.sample_rate as i32);
        audio_enc.set_format(ENCODER_SAMPLE_FMT);
        audio_enc.set_channel_layout(layout);
        audio_enc.set_bit_rate(bitrate as usize);

        let encoder = audio_enc
            .open_as(aac)
            .map_err(|e| EncoderError::Configure(format!("Failed to open AAC encoder: {}", e)))?;

        let frame_size = match encoder.frame_size() as usize {
            0 => AAC_FRAME_SIZE,
            n => n,
        };

        tracing::debug!(
            sample_rate = format.sample_rate,
            channels = format.channel_count,
            bitrate,
            frame_size,
            "ffmpeg aac: encoder opened"
        );

        Ok(Self {
            encoder,
            configuration: MediaFormat {
                codec: AudioCodec::Aac,
                sample_rate: format.sample_rate,
                channel_count: format.channel_count,
                pcm_encoding: Some(encoding),
                average_bitrate: u32::try_from(bitrate).ok(),
            },
            input_format,
            layout,
            frame_size,
            pending: BytesMut::new(),
            samples_sent: 0,
            output: VecDeque::new(),
            output_format_known: false,
            input_ended: false,
            eof_reached: false,
            released: false,
        })
    }

    /// The number of samples per channel the AAC encoder expects per frame.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn frame_bytes(&self) -> usize {
        self.frame_size * self.input_format.bytes_per_frame()
    }

    fn check_not_released(&self) -> Result<(), EncoderError> {
        if self.released {
            return Err(EncoderError::InvalidState("encoder released"));
        }
        Ok(())
    }

    /// Convert interleaved PCM to one planar float frame and send it.
    fn encode_chunk(&mut self, pcm: &[u8]) -> Result<(), EncoderError> {
        let channels = self.input_format.channel_count as usize;
        let sample_bytes = self.input_format.encoding.bytes_per_sample();
        let samples = pcm.len() / self.input_format.bytes_per_frame();
        if samples == 0 {
            return Ok(());
        }

        let mut frame = ffmpeg::util::frame::Audio::new(ENCODER_SAMPLE_FMT, samples, self.layout);
        frame.set_rate(self.input_format.sample_rate);
        frame.set_pts(Some(self.samples_sent));

        for ch in 0..channels {
            let plane = frame.data_mut(ch);
            for i in 0..samples {
                let at = (i * channels + ch) * sample_bytes;
                let value = match self.input_format.encoding {
                    PcmEncoding::F32Le => f32::from_le_bytes([
                        pcm[at],
                        pcm[at + 1],
                        pcm[at + 2],
                        pcm[at + 3],
                    ]),
                    _ => i16::from_le_bytes([pcm[at], pcm[at + 1]]) as f32 / 32768.0,
                };
                plane[i * 4..i * 4 + 4].copy_from_slice(&value.to_ne_bytes());
            }
        }

        self.encoder.send_frame(&frame).map_err(|e| {
            EncoderError::QueueInput(format!("AAC encoder send_frame error: {}", e))
        })?;
        self.samples_sent += samples as i64;
        self.drain_packets()
    }

    /// Move every packet the encoder has ready into the output queue.
    fn drain_packets(&mut self) -> Result<(), EncoderError> {
        loop {
            let mut packet = ffmpeg::codec::packet::Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    // priming packets carry negative pts
                    let time_us = pts_to_us(
                        packet.pts().unwrap_or(0),
                        self.input_format.sample_rate,
                    );
                    let data = Bytes::copy_from_slice(packet.data().unwrap_or_default());
                    self.output_format_known = true;
                    self.output.push_back(EncodedBuffer { data, time_us });
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => {
                    self.eof_reached = true;
                    return Ok(());
                }
                Err(e) => {
                    return Err(EncoderError::DequeueOutput(format!(
                        "AAC encoder receive_packet error: {}",
                        e
                    )))
                }
            }
        }
    }
}

impl FrameEncoder for FfmpegAacEncoder {
    fn name(&self) -> &'static str {
        "ffmpeg-aac"
    }

    fn configuration_format(&self) -> &MediaFormat {
        &self.configuration
    }

    fn maybe_dequeue_input_buffer(&mut self, slot: &mut InputSlot) -> Result<bool, EncoderError> {
        self.check_not_released()?;
        if self.input_ended || self.output.len() >= MAX_PENDING_OUTPUT {
            return Ok(false);
        }
        slot.loan(self.frame_bytes());
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

        // AAC needs whole frames; only the last one may be short
        self.pending.extend_from_slice(&input.data);
        let frame_bytes = self.frame_bytes();
        while self.pending.len() >= frame_bytes {
            let chunk = self.pending.split_to(frame_bytes);
            self.encode_chunk(&chunk)?;
        }

        if input.is_end_of_stream() {
            self.input_ended = true;
            self.output_format_known = true;
            let tail = self.pending.split();
            self.encode_chunk(&tail)?;
            self.encoder.send_eof().map_err(|e| {
                EncoderError::QueueInput(format!("AAC encoder send_eof error: {}", e))
            })?;
            self.drain_packets()?;
            tracing::debug!(
                samples = self.samples_sent,
                "ffmpeg aac: end of stream queued"
            );
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
        self.eof_reached && self.output.is_empty()
    }

    fn release(&mut self) {
        self.output.clear();
        self.pending.clear();
        self.released = true;
    }
}

/// Factory producing [`FfmpegAacEncoder`]s
#[derive(Debug, Clone, Copy)]
pub struct FfmpegEncoderFactory {
    _private: (),
}

impl FfmpegEncoderFactory {
    /// Initialize FFmpeg and create the factory.
    pub fn new() -> Result<Self, EncoderError> {
        ffmpeg::init().map_err(|e| {
            EncoderError::Configure(format!("ffmpeg::init() failed: {}", e))
        })?;
        tracing::info!("FFmpeg initialized");
        Ok(Self { _private: () })
    }
}

impl EncoderFactory for FfmpegEncoderFactory {
    fn create_for_audio_encoding(
        &self,
        format: &MediaFormat,
    ) -> Result<Box<dyn FrameEncoder>, EncoderError> {
        if format.codec != AudioCodec::Aac {
            return Err(EncoderError::EncoderNotFound(format.codec.to_string()));
        }
        Ok(Box::new(FfmpegAacEncoder::open(format)?))
    }

    fn supports_codec(&self, codec: AudioCodec) -> bool {
        codec == AudioCodec::Aac && is_aac_encoder_available()
    }
}

/// Convert a pts in `1/sample_rate` units to microseconds.
fn pts_to_us(pts: i64, sample_rate: u32) -> i64 {
    let us = i128::from(pts) * i128::from(MICROS_PER_SECOND) / i128::from(sample_rate.max(1));
    us.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Check whether the FFmpeg build includes an AAC encoder.
pub fn is_aac_encoder_available() -> bool {
    codec::encoder::find(codec::Id::AAC).is_some()
}

/// Get recommended AAC bitrate for a given channel count.
pub fn get_recommended_bitrate(channels: u16) -> u64 {
    if channels == 1 {
        64_000
    } else {
        128_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo_s16() -> MediaFormat {
        MediaFormat::for_audio(
            AudioCodec::Aac,
            &AudioFormat::new(48_000, 2, PcmEncoding::S16Le),
        )
    }

    #[test]
    fn test_get_recommended_bitrate() {
        assert_eq!(get_recommended_bitrate(1), 64_000);
        assert_eq!(get_recommended_bitrate(2), 128_000);
    }

    #[test]
    fn test_pts_to_us_keeps_priming_offset() {
        assert_eq!(pts_to_us(-1024, 48_000), -21_333);
        assert_eq!(pts_to_us(0, 48_000), 0);
        assert_eq!(pts_to_us(48_000, 48_000), 1_000_000);
        assert!(pts_to_us(-1024, 48_000) < pts_to_us(0, 48_000));
    }

    #[test]
    fn test_empty_input_reports_format_and_ends() {
        let factory = FfmpegEncoderFactory::new().unwrap();
        if !factory.supports_codec(AudioCodec::Aac) {
            return;
        }
        let mut encoder = factory.create_for_audio_encoding(&stereo_s16()).unwrap();
        let mut slot = InputSlot::new();
        assert!(encoder.maybe_dequeue_input_buffer(&mut slot).unwrap());
        slot.flags.insert(crate::encoder::BufferFlags::END_OF_STREAM);
        encoder.queue_input_buffer(&mut slot).unwrap();

        let format = encoder.output_format().unwrap();
        assert_eq!(format.map(|f| f.codec), Some(AudioCodec::Aac));
        while encoder.output_buffer().unwrap().is_some() {
            encoder.release_output_buffer(false).unwrap();
        }
        assert!(encoder.is_ended());
    }

    #[test]
    fn test_rejects_surround_input() {
        let mut format = stereo_s16();
        format.channel_count = 6;
        assert!(matches!(
            FfmpegAacEncoder::open(&format),
            Err(EncoderError::Configure(_))
        ));
    }

    #[test]
    fn test_encode_silence_to_end() {
        let factory = FfmpegEncoderFactory::new().unwrap();
        if !factory.supports_codec(AudioCodec::Aac) {
            return;
        }
        let mut encoder = factory.create_for_audio_encoding(&stereo_s16()).unwrap();
        let mut slot = InputSlot::new();
        let mut packets = 0;

        for _ in 0..5 {
            assert!(encoder.maybe_dequeue_input_buffer(&mut slot).unwrap());
            let silence = vec![0u8; slot.capacity()];
            slot.fill_from(&silence);
            encoder.queue_input_buffer(&mut slot).unwrap();
            while encoder.output_buffer().unwrap().is_some() {
                encoder.release_output_buffer(false).unwrap();
                packets += 1;
            }
        }

        assert!(encoder.maybe_dequeue_input_buffer(&mut slot).unwrap());
        slot.flags.insert(crate::encoder::BufferFlags::END_OF_STREAM);
        encoder.queue_input_buffer(&mut slot).unwrap();
        while encoder.output_buffer().unwrap().is_some() {
            encoder.release_output_buffer(false).unwrap();
            packets += 1;
        }

        assert!(encoder.is_ended());
        assert!(packets >= 5);
    }
}
