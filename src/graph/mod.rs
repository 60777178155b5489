//! Upstream audio graph port
//!
//! This module defines what the exporter needs from the chain that produces
//! processed PCM:
//! - A pull interface returning the current output window
//! - An end-of-input signal
//! - Release of the chain's resources

pub mod pcm_queue;

pub use pcm_queue::PcmQueueSource;

use bytes::Bytes;

use crate::format::AudioFormat;

/// Unconsumed span of PCM bytes owned by an audio source.
///
/// The exporter only moves the cursor forward; the storage stays with the
/// source and is replaced by it once fully consumed.
#[derive(Debug, Clone, Default)]
pub struct SourceWindow {
    data: Bytes,
    position: usize,
}

impl SourceWindow {
    pub fn new(data: Bytes) -> Self {
        Self { data, position: 0 }
    }

    /// An empty, fully consumed window.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bytes between the cursor and the end of the window.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.position..]
    }

    pub fn remaining_len(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn limit(&self) -> usize {
        self.data.len()
    }

    /// Mark `count` bytes as consumed.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the remaining length.
    pub fn advance(&mut self, count: usize) {
        assert!(
            count <= self.remaining_len(),
            "advance past window limit: {} > {}",
            count,
            self.remaining_len()
        );
        self.position += count;
    }
}

/// Producer of processed PCM audio
pub trait AudioSource {
    /// Format of the bytes returned by [`AudioSource::pull_output`].
    fn output_format(&self) -> AudioFormat;

    /// Current output window.
    ///
    /// Calling this again before the window is consumed returns the same
    /// window; once it is consumed the source may move on to new data. The
    /// returned window must not be kept past the next call.
    fn pull_output(&mut self) -> &mut SourceWindow;

    /// Whether all input has been pulled and consumed.
    fn is_ended(&self) -> bool;

    /// Release any resources held by the source. Must be idempotent.
    fn release(&mut self);
}

impl<T: AudioSource + ?Sized> AudioSource for Box<T> {
    fn output_format(&self) -> AudioFormat {
        (**self).output_format()
    }

    fn pull_output(&mut self) -> &mut SourceWindow {
        (**self).pull_output()
    }

    fn is_ended(&self) -> bool {
        (**self).is_ended()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
