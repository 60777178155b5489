//! Byte-count based timestamps
//!
//! Output timing is reconstructed from the number of PCM bytes the encoder
//! has accepted; there is no clock involved.

use crate::error::{ExportError, Result};
use crate::format::AudioFormat;

pub const MICROS_PER_SECOND: u64 = 1_000_000;

/// Duration in microseconds of the whole frames contained in `total_bytes`.
///
/// `floor(total_bytes / bytes_per_frame) * 1_000_000 / sample_rate`, computed
/// in 128 bits and saturated to `i64::MAX`.
pub fn duration_us_for_bytes(total_bytes: u64, format: &AudioFormat) -> i64 {
    let bytes_per_frame = format.bytes_per_frame() as u128;
    if bytes_per_frame == 0 || format.sample_rate == 0 {
        return 0;
    }
    let frames = total_bytes as u128 / bytes_per_frame;
    let us = frames * MICROS_PER_SECOND as u128 / format.sample_rate as u128;
    i64::try_from(us).unwrap_or(i64::MAX)
}

/// Monotonic count of bytes handed to the encoder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputByteCounter {
    total: u64,
}

impl InputByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Account for `bytes` more input.
    pub fn add(&mut self, bytes: usize) -> Result<u64> {
        self.total = u64::try_from(bytes)
            .ok()
            .and_then(|b| self.total.checked_add(b))
            .ok_or_else(|| {
                ExportError::InvalidTimestamp(format!(
                    "input byte count overflow: {} + {}",
                    self.total, bytes
                ))
            })?;
        Ok(self.total)
    }

    /// Position in microseconds of the input accounted for so far.
    pub fn duration_us(&self, format: &AudioFormat) -> i64 {
        duration_us_for_bytes(self.total, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PcmEncoding;

    fn stereo_s16(rate: u32) -> AudioFormat {
        AudioFormat::new(rate, 2, PcmEncoding::S16Le)
    }

    #[test]
    fn test_duration_one_second() {
        let format = stereo_s16(48_000);
        assert_eq!(duration_us_for_bytes(48_000 * 4, &format), 1_000_000);
    }

    #[test]
    fn test_duration_ignores_partial_frames() {
        let format = stereo_s16(48_000);
        // 3 bytes is less than one 4-byte frame
        assert_eq!(duration_us_for_bytes(3, &format), 0);
        assert_eq!(
            duration_us_for_bytes(7, &format),
            duration_us_for_bytes(4, &format)
        );
    }

    #[test]
    fn test_duration_floors_micros() {
        // one frame at 44.1 kHz is 22.675... us
        let format = AudioFormat::new(44_100, 1, PcmEncoding::U8);
        assert_eq!(duration_us_for_bytes(1, &format), 22);
        assert_eq!(duration_us_for_bytes(44_100, &format), 1_000_000);
    }

    #[test]
    fn test_duration_large_counts_do_not_overflow() {
        let format = AudioFormat::new(8_000, 1, PcmEncoding::U8);
        let us = duration_us_for_bytes(u64::MAX, &format);
        assert_eq!(us, i64::MAX);
    }

    #[test]
    fn test_counter_accumulates() {
        let mut counter = InputByteCounter::new();
        assert_eq!(counter.add(4).unwrap(), 4);
        assert_eq!(counter.add(7).unwrap(), 11);
        assert_eq!(counter.total(), 11);
        assert_eq!(counter.duration_us(&stereo_s16(1_000)), 2_000);
    }

    #[test]
    fn test_counter_overflow_is_an_error() {
        let mut counter = InputByteCounter { total: u64::MAX - 1 };
        let err = counter.add(2).unwrap_err();
        assert!(matches!(err, ExportError::InvalidTimestamp(_)));
        assert_eq!(counter.total(), u64::MAX - 1);
    }
}
