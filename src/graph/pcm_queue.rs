//! In-memory audio source fed with PCM chunks
//!
//! Decoded audio is queued chunk by chunk by the caller; each chunk becomes
//! one output window once the previous window has been consumed.

use std::collections::VecDeque;

use bytes::Bytes;

use super::{AudioSource, SourceWindow};
use crate::error::UnhandledAudioFormat;
use crate::format::{AudioFormat, PcmEncoding};

/// PCM encodings this source can hand to an encoder
pub const SUPPORTED_ENCODINGS: &[PcmEncoding] = &[PcmEncoding::S16Le, PcmEncoding::F32Le];

/// Queue-backed [`AudioSource`]
#[derive(Debug)]
pub struct PcmQueueSource {
    format: AudioFormat,
    pending: VecDeque<Bytes>,
    window: SourceWindow,
    input_ended: bool,
    released: bool,
}

impl PcmQueueSource {
    /// Create a source for PCM in `format`.
    ///
    /// Fails when the format is incomplete or its encoding is not one of
    /// [`SUPPORTED_ENCODINGS`].
    pub fn new(format: AudioFormat) -> Result<Self, UnhandledAudioFormat> {
        if !format.is_valid() {
            return Err(UnhandledAudioFormat::new(
                format,
                "sample rate and channel count must be non-zero",
            ));
        }
        if !SUPPORTED_ENCODINGS.contains(&format.encoding) {
            return Err(UnhandledAudioFormat::unsupported_encoding(
                format,
                format.encoding,
            ));
        }
        Ok(Self {
            format,
            pending: VecDeque::new(),
            window: SourceWindow::empty(),
            input_ended: false,
            released: false,
        })
    }

    /// Append a chunk of PCM.
    ///
    /// Returns `false` and drops the data when input was already ended or the
    /// source has been released.
    pub fn queue_input(&mut self, data: Bytes) -> bool {
        if self.input_ended || self.released {
            tracing::warn!(
                bytes = data.len(),
                "pcm queue: dropping input queued after end of input"
            );
            return false;
        }
        if !data.is_empty() {
            self.pending.push_back(data);
        }
        true
    }

    /// No more input will be queued.
    pub fn signal_end_of_input(&mut self) {
        self.input_ended = true;
    }

    /// Bytes queued but not yet consumed, including the current window.
    pub fn pending_bytes(&self) -> usize {
        self.window.remaining_len() + self.pending.iter().map(Bytes::len).sum::<usize>()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl AudioSource for PcmQueueSource {
    fn output_format(&self) -> AudioFormat {
        self.format
    }

    fn pull_output(&mut self) -> &mut SourceWindow {
        if !self.window.has_remaining() {
            if let Some(next) = self.pending.pop_front() {
                self.window = SourceWindow::new(next);
            }
        }
        &mut self.window
    }

    fn is_ended(&self) -> bool {
        self.input_ended && self.pending.is_empty() && !self.window.has_remaining()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.pending.clear();
        self.window = SourceWindow::empty();
        self.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s16_stereo() -> AudioFormat {
        AudioFormat::new(48_000, 2, PcmEncoding::S16Le)
    }

    #[test]
    fn test_rejects_unsupported_encoding() {
        let err = PcmQueueSource::new(AudioFormat::new(48_000, 2, PcmEncoding::S24Le)).unwrap_err();
        assert_eq!(err.format.encoding, PcmEncoding::S24Le);
    }

    #[test]
    fn test_rejects_incomplete_format() {
        assert!(PcmQueueSource::new(AudioFormat::new(0, 2, PcmEncoding::S16Le)).is_err());
        assert!(PcmQueueSource::new(AudioFormat::new(48_000, 0, PcmEncoding::F32Le)).is_err());
    }

    #[test]
    fn test_pull_returns_same_window_until_consumed() {
        let mut source = PcmQueueSource::new(s16_stereo()).unwrap();
        source.queue_input(Bytes::from_static(&[1, 2, 3, 4]));
        source.queue_input(Bytes::from_static(&[5, 6]));

        source.pull_output().advance(2);
        assert_eq!(source.pull_output().remaining(), &[3, 4]);
        source.pull_output().advance(2);

        // consumed: the next pull moves on to the next chunk
        assert_eq!(source.pull_output().remaining(), &[5, 6]);
    }

    #[test]
    fn test_ended_only_after_everything_consumed() {
        let mut source = PcmQueueSource::new(s16_stereo()).unwrap();
        source.queue_input(Bytes::from_static(&[1, 2, 3, 4]));
        source.signal_end_of_input();
        assert!(!source.is_ended());

        let window = source.pull_output();
        let len = window.remaining_len();
        window.advance(len);
        assert!(source.is_ended());
    }

    #[test]
    fn test_empty_chunks_are_skipped() {
        let mut source = PcmQueueSource::new(s16_stereo()).unwrap();
        assert!(source.queue_input(Bytes::new()));
        assert_eq!(source.pending_bytes(), 0);
        assert!(!source.pull_output().has_remaining());
    }

    #[test]
    fn test_input_after_end_is_dropped() {
        let mut source = PcmQueueSource::new(s16_stereo()).unwrap();
        source.signal_end_of_input();
        assert!(!source.queue_input(Bytes::from_static(&[0, 0, 0, 0])));
        assert!(source.is_ended());
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut source = PcmQueueSource::new(s16_stereo()).unwrap();
        source.queue_input(Bytes::from_static(&[0; 8]));
        source.release();
        source.release();
        assert!(source.is_released());
        assert_eq!(source.pending_bytes(), 0);
    }
}
