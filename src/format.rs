//! Media format descriptors
//!
//! Raw PCM layout handed to the encoder, the codec identifiers the stage can
//! negotiate, and the caller's transformation request.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Average bitrate requested from the encoder when the request names none
pub const DEFAULT_ENCODER_BITRATE: u32 = 128 * 1024;

/// Sample encoding of interleaved PCM data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcmEncoding {
    U8,
    S16Le,
    S24Le,
    S32Le,
    F32Le,
}

impl PcmEncoding {
    /// Bytes used by one sample of one channel.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            PcmEncoding::U8 => 1,
            PcmEncoding::S16Le => 2,
            PcmEncoding::S24Le => 3,
            PcmEncoding::S32Le | PcmEncoding::F32Le => 4,
        }
    }
}

/// Layout of interleaved PCM audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Frames per second
    pub sample_rate: u32,
    pub channel_count: u16,
    pub encoding: PcmEncoding,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channel_count: u16, encoding: PcmEncoding) -> Self {
        Self {
            sample_rate,
            channel_count,
            encoding,
        }
    }

    /// Bytes per frame: one sample for each channel.
    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.bytes_per_sample() * self.channel_count as usize
    }

    /// A format is usable when it describes at least one channel at a
    /// non-zero rate.
    pub fn is_valid(&self) -> bool {
        self.sample_rate > 0 && self.channel_count > 0
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} ch, {:?}",
            self.sample_rate, self.channel_count, self.encoding
        )
    }
}

/// Codec of an encoded audio track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Aac,
    Ac3,
    Eac3,
    Opus,
    Vorbis,
    Mp3,
    Flac,
    AmrNb,
    AmrWb,
    /// Uncompressed PCM access units
    Raw,
}

impl AudioCodec {
    /// MIME type of the elementary stream
    pub fn mime_type(self) -> &'static str {
        match self {
            AudioCodec::Aac => "audio/mp4a-latm",
            AudioCodec::Ac3 => "audio/ac3",
            AudioCodec::Eac3 => "audio/eac3",
            AudioCodec::Opus => "audio/opus",
            AudioCodec::Vorbis => "audio/vorbis",
            AudioCodec::Mp3 => "audio/mpeg",
            AudioCodec::Flac => "audio/flac",
            AudioCodec::AmrNb => "audio/3gpp",
            AudioCodec::AmrWb => "audio/amr-wb",
            AudioCodec::Raw => "audio/raw",
        }
    }

    const ALL: [AudioCodec; 10] = [
        AudioCodec::Aac,
        AudioCodec::Ac3,
        AudioCodec::Eac3,
        AudioCodec::Opus,
        AudioCodec::Vorbis,
        AudioCodec::Mp3,
        AudioCodec::Flac,
        AudioCodec::AmrNb,
        AudioCodec::AmrWb,
        AudioCodec::Raw,
    ];
}

impl fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

impl FromStr for AudioCodec {
    type Err = String;

    /// Accepts a MIME type (`audio/opus`) or a short name (`opus`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        AudioCodec::ALL
            .iter()
            .copied()
            .find(|codec| {
                codec.mime_type() == needle || format!("{:?}", codec).to_lowercase() == needle
            })
            .ok_or_else(|| format!("unknown audio codec: {}", s))
    }
}

/// Format descriptor exchanged with encoders and sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub codec: AudioCodec,
    pub sample_rate: u32,
    pub channel_count: u16,
    /// PCM encoding of the encoder input, when relevant
    pub pcm_encoding: Option<PcmEncoding>,
    /// Average bitrate in bits per second
    pub average_bitrate: Option<u32>,
}

impl MediaFormat {
    /// Describe `codec` output for PCM input in `input`.
    pub fn for_audio(codec: AudioCodec, input: &AudioFormat) -> Self {
        Self {
            codec,
            sample_rate: input.sample_rate,
            channel_count: input.channel_count,
            pcm_encoding: Some(input.encoding),
            average_bitrate: None,
        }
    }

    pub fn with_codec(mut self, codec: AudioCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_average_bitrate(mut self, bitrate: u32) -> Self {
        self.average_bitrate = Some(bitrate);
        self
    }
}

/// What the caller asked the export to produce
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformationRequest {
    /// Output codec; `None` keeps the codec of the input asset
    #[serde(default)]
    pub audio_codec: Option<AudioCodec>,

    /// Average encoder bitrate; `None` uses [`DEFAULT_ENCODER_BITRATE`]
    #[serde(default)]
    pub average_bitrate: Option<u32>,
}

impl TransformationRequest {
    pub fn with_audio_codec(mut self, codec: AudioCodec) -> Self {
        self.audio_codec = Some(codec);
        self
    }
}
