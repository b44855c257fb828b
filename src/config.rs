//! Stream configuration types.

use crate::error::StreamError;
use crate::format::SampleFormat;

/// Transfer direction of a stream session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Process → device (playing a file).
    #[default]
    Playback,
    /// Device → process (recording to a file).
    Capture,
}

/// How channel samples are laid out for device I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// One buffer with channel samples interleaved per frame.
    #[default]
    Interleaved,
    /// One buffer per channel ("separate channels" file mode).
    Planar,
}

/// Which device transfer primitive family the backend was opened with.
///
/// Resolved once at configuration time; the engine is agnostic to the
/// choice and only the device backend behaves differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMethod {
    /// Classic buffered read/write primitives.
    #[default]
    Buffered,
    /// Memory-mapped transfer primitives.
    MemoryMapped,
}

/// Shorthand presets for common format/rate/channel combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatPreset {
    /// 16 bit little endian, 44100 Hz, stereo.
    Cd,
    /// 16 bit big endian, 44100 Hz, stereo.
    Cdr,
    /// 16 bit little endian, 48000 Hz, stereo.
    Dat,
}

impl FormatPreset {
    /// Parses a preset name, case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cd" => Some(Self::Cd),
            "cdr" => Some(Self::Cdr),
            "dat" => Some(Self::Dat),
            _ => None,
        }
    }

    /// The sample format this preset selects.
    #[must_use]
    pub fn format(&self) -> SampleFormat {
        match self {
            Self::Cd | Self::Dat => SampleFormat::S16_LE,
            Self::Cdr => SampleFormat::S16_BE,
        }
    }

    /// The frame rate this preset selects.
    #[must_use]
    pub fn rate(&self) -> u32 {
        match self {
            Self::Cd | Self::Cdr => 44_100,
            Self::Dat => 48_000,
        }
    }

    /// The channel count this preset selects.
    #[must_use]
    pub fn channels(&self) -> usize {
        2
    }
}

/// Limit on the total amount of audio to transfer.
///
/// Duration and sample-count limits are mutually exclusive at the CLI
/// surface; the engine only sees the resolved variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferLimit {
    /// Run until the input ends (playback) or forever (capture).
    #[default]
    Unlimited,
    /// Stop after this many seconds of audio.
    Seconds(u64),
    /// Stop after this many samples per channel.
    Samples(u64),
}

impl TransferLimit {
    /// Resolves the limit to a byte count for the given configuration.
    ///
    /// Capture byte counts are rounded to an even number of bytes (a
    /// historical artifact of container alignment, kept for compatibility);
    /// an unlimited capture rounds down from the maximum instead.
    pub fn byte_count(&self, config: &StreamConfig) -> u64 {
        let bpf = config.bytes_per_frame() as u64;
        let count = match self {
            Self::Unlimited => u64::MAX,
            Self::Seconds(secs) => secs * u64::from(config.rate) * bpf,
            Self::Samples(samples) => samples * bpf,
        };
        if config.direction == Direction::Capture {
            if count == u64::MAX {
                count - count % 2
            } else {
                count + count % 2
            }
        } else {
            count
        }
    }
}

/// Effective stream configuration, immutable once negotiated.
///
/// This is the *result* of parameter negotiation with the device - the
/// engine never negotiates itself, it only consumes chunk/buffer sizing and
/// thresholds the device layer reports back.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Transfer direction.
    pub direction: Direction,
    /// Sample encoding.
    pub format: SampleFormat,
    /// Channel count (1 = mono, 2 = stereo, ...).
    pub channels: usize,
    /// Frame rate in Hz.
    pub rate: u32,
    /// Frames per chunk - the engine's unit of device I/O.
    pub chunk_frames: usize,
    /// Frames in the device ring buffer.
    pub buffer_frames: usize,
    /// Channel layout for device I/O.
    pub access: AccessMode,
    /// Transfer primitive family the device was opened with.
    pub method: TransferMethod,
    /// Frames queued before the device auto-starts.
    pub start_threshold: u64,
    /// Fill level at which the device auto-stops after a fault.
    pub stop_threshold: u64,
}

impl StreamConfig {
    /// Bytes in one frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * self.channels
    }

    /// Bytes in one chunk.
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_frames * self.bytes_per_frame()
    }

    /// Byte rate of the stream, used for size-based file rotation.
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.rate) * self.bytes_per_frame() as u64
    }

    /// Checks the structural invariants of a negotiated configuration.
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.channels == 0 {
            return Err(StreamError::config("channel count must be at least 1"));
        }
        if self.bytes_per_frame() == 0 {
            return Err(StreamError::config("bytes per frame must be positive"));
        }
        if self.chunk_frames == 0 {
            return Err(StreamError::config("chunk size must be positive"));
        }
        if self.chunk_frames >= self.buffer_frames {
            return Err(StreamError::config(format!(
                "chunk size must be smaller than buffer size ({} >= {})",
                self.chunk_frames, self.buffer_frames
            )));
        }
        Ok(())
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            direction: Direction::Playback,
            format: SampleFormat::U8,
            channels: 1,
            rate: 8000,
            chunk_frames: 1024,
            buffer_frames: 4096,
            access: AccessMode::Interleaved,
            method: TransferMethod::Buffered,
            start_threshold: 4096,
            stop_threshold: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_cd() {
        let p = FormatPreset::parse("CD").unwrap();
        assert_eq!(p.format(), SampleFormat::S16_LE);
        assert_eq!(p.rate(), 44_100);
        assert_eq!(p.channels(), 2);
    }

    #[test]
    fn test_preset_cdr_is_big_endian() {
        assert_eq!(FormatPreset::Cdr.format(), SampleFormat::S16_BE);
    }

    #[test]
    fn test_preset_dat() {
        let p = FormatPreset::parse("dat").unwrap();
        assert_eq!(p.rate(), 48_000);
        assert_eq!(p.format(), SampleFormat::S16_LE);
    }

    #[test]
    fn test_config_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.format, SampleFormat::U8);
        assert_eq!(config.rate, 8000);
        assert_eq!(config.channels, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bytes_per_frame() {
        let config = StreamConfig {
            format: SampleFormat::S16_LE,
            channels: 2,
            ..StreamConfig::default()
        };
        assert_eq!(config.bytes_per_frame(), 4);
        assert_eq!(config.chunk_bytes(), 4096);
    }

    #[test]
    fn test_validate_rejects_chunk_not_smaller_than_buffer() {
        let config = StreamConfig {
            chunk_frames: 4096,
            buffer_frames: 4096,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_channels() {
        let config = StreamConfig {
            channels: 0,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limit_seconds_to_bytes() {
        let config = StreamConfig::default(); // 8000 Hz, 1 byte/frame
        assert_eq!(TransferLimit::Seconds(2).byte_count(&config), 16_000);
    }

    #[test]
    fn test_limit_samples_to_bytes() {
        let config = StreamConfig {
            format: SampleFormat::S16_LE,
            channels: 2,
            ..StreamConfig::default()
        };
        // 100 samples per channel → 100 frames × 4 bytes
        assert_eq!(TransferLimit::Samples(100).byte_count(&config), 400);
    }

    #[test]
    fn test_capture_limit_rounds_to_even() {
        let config = StreamConfig {
            direction: Direction::Capture,
            rate: 8001,
            ..StreamConfig::default()
        };
        let count = TransferLimit::Seconds(1).byte_count(&config);
        assert_eq!(count % 2, 0);
        assert_eq!(count, 8002);
    }

    #[test]
    fn test_unlimited_capture_rounds_down() {
        let config = StreamConfig {
            direction: Direction::Capture,
            ..StreamConfig::default()
        };
        let count = TransferLimit::Unlimited.byte_count(&config);
        assert_eq!(count % 2, 0);
        assert!(count > u64::MAX - 2);
    }
}
