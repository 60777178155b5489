//! Output format negotiation and fallback reporting
//!
//! The encoder that ends up being used may differ from what the caller asked
//! for. The caller is told exactly once, during construction of the stage,
//! which request is actually being fulfilled.

use crate::encoder::EncoderFactory;
use crate::error::{ExportError, Result};
use crate::format::{AudioCodec, MediaFormat, TransformationRequest};

/// Receives the finalized transformation request
pub trait FallbackListener {
    fn on_transformation_request_finalized(&mut self, request: TransformationRequest);
}

impl<F: FnMut(TransformationRequest)> FallbackListener for F {
    fn on_transformation_request_finalized(&mut self, request: TransformationRequest) {
        self(request)
    }
}

/// Listener that remembers the finalized request and logs deviations from
/// the original one
#[derive(Debug, Clone)]
pub struct FallbackTracker {
    original: TransformationRequest,
    finalized: Option<TransformationRequest>,
}

impl FallbackTracker {
    pub fn new(original: TransformationRequest) -> Self {
        Self {
            original,
            finalized: None,
        }
    }

    pub fn finalized(&self) -> Option<&TransformationRequest> {
        self.finalized.as_ref()
    }

    /// Whether the finalized request differs from the original.
    pub fn fallback_applied(&self) -> bool {
        self.finalized
            .as_ref()
            .is_some_and(|finalized| *finalized != self.original)
    }
}

impl FallbackListener for FallbackTracker {
    fn on_transformation_request_finalized(&mut self, request: TransformationRequest) {
        if request != self.original {
            tracing::warn!(
                requested = ?self.original.audio_codec,
                actual = ?request.audio_codec,
                "fallback applied to transformation request"
            );
        }
        self.finalized = Some(request);
    }
}

/// Pick the output codec for `requested`.
///
/// The requested codec is tried first, then every codec the sink supports in
/// its order of preference. The first one the sink accepts and the encoder
/// factory can produce wins.
pub fn find_supported_codec(
    requested: &MediaFormat,
    sink_codecs: &[AudioCodec],
    encoder_factory: &dyn EncoderFactory,
) -> Result<AudioCodec> {
    std::iter::once(requested.codec)
        .chain(sink_codecs.iter().copied())
        .find(|codec| sink_codecs.contains(codec) && encoder_factory.supports_codec(*codec))
        .ok_or_else(|| {
            ExportError::Config(format!(
                "no codec supported by both encoder and muxer (requested {}, muxer supports {:?})",
                requested.codec, sink_codecs
            ))
        })
}

/// The request that is actually being fulfilled.
///
/// Only the codec is compared: when the encoder ended up with the requested
/// codec the original request is returned unchanged, otherwise a copy with
/// just the audio codec replaced.
pub fn create_fallback_transformation_request(
    request: &TransformationRequest,
    requested_format: &MediaFormat,
    actual_format: &MediaFormat,
) -> TransformationRequest {
    // TODO: include bitrate and other audio characteristics once encoders
    // report what they actually configured for them.
    if requested_format.codec == actual_format.codec {
        return request.clone();
    }
    TransformationRequest {
        audio_codec: Some(actual_format.codec),
        ..request.clone()
    }
}
