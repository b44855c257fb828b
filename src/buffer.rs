//! The reusable chunk transfer buffer.

use crate::config::{AccessMode, StreamConfig};

/// One chunk's worth of audio bytes, owned by the active session.
///
/// Interleaved streams use a single buffer of `chunk_frames ×
/// bytes_per_frame` bytes; planar streams use one buffer per channel of
/// `chunk_frames × bytes_per_sample` bytes. The buffer is allocated once
/// and only re-sized when the configuration changes.
#[derive(Debug)]
pub enum TransferBuffer {
    /// Single interleaved buffer.
    Interleaved(Vec<u8>),
    /// One buffer per channel.
    Planar(Vec<Vec<u8>>),
}

impl TransferBuffer {
    /// Allocates a buffer sized for the given configuration.
    pub fn new(config: &StreamConfig) -> Self {
        match config.access {
            AccessMode::Interleaved => Self::Interleaved(vec![0; config.chunk_bytes()]),
            AccessMode::Planar => {
                let per_channel = config.chunk_frames * config.format.bytes_per_sample();
                Self::Planar(vec![vec![0; per_channel]; config.channels])
            }
        }
    }

    /// Re-sizes the buffer for a changed configuration, preserving nothing.
    pub fn reconfigure(&mut self, config: &StreamConfig) {
        *self = Self::new(config);
    }

    /// The interleaved buffer. Panics when the stream is planar.
    pub fn interleaved(&self) -> &[u8] {
        match self {
            Self::Interleaved(buf) => buf,
            Self::Planar(_) => panic!("planar stream has no interleaved buffer"),
        }
    }

    /// Mutable interleaved buffer. Panics when the stream is planar.
    pub fn interleaved_mut(&mut self) -> &mut [u8] {
        match self {
            Self::Interleaved(buf) => buf,
            Self::Planar(_) => panic!("planar stream has no interleaved buffer"),
        }
    }

    /// Per-channel buffers. Panics when the stream is interleaved.
    pub fn planar(&self) -> &[Vec<u8>] {
        match self {
            Self::Planar(bufs) => bufs,
            Self::Interleaved(_) => panic!("interleaved stream has no planar buffers"),
        }
    }

    /// Mutable per-channel buffers. Panics when the stream is interleaved.
    pub fn planar_mut(&mut self) -> &mut [Vec<u8>] {
        match self {
            Self::Planar(bufs) => bufs,
            Self::Interleaved(_) => panic!("interleaved stream has no planar buffers"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SampleFormat;

    #[test]
    fn test_interleaved_sizing() {
        let config = StreamConfig {
            format: SampleFormat::S16_LE,
            channels: 2,
            chunk_frames: 512,
            ..StreamConfig::default()
        };
        let buffer = TransferBuffer::new(&config);
        assert_eq!(buffer.interleaved().len(), 512 * 4);
    }

    #[test]
    fn test_planar_sizing() {
        let config = StreamConfig {
            format: SampleFormat::S16_LE,
            channels: 2,
            chunk_frames: 512,
            access: AccessMode::Planar,
            ..StreamConfig::default()
        };
        let buffer = TransferBuffer::new(&config);
        assert_eq!(buffer.planar().len(), 2);
        assert_eq!(buffer.planar()[0].len(), 512 * 2);
    }

    #[test]
    fn test_reconfigure_resizes() {
        let mut config = StreamConfig::default();
        let mut buffer = TransferBuffer::new(&config);
        assert_eq!(buffer.interleaved().len(), 1024);

        config.chunk_frames = 2048;
        config.buffer_frames = 8192;
        buffer.reconfigure(&config);
        assert_eq!(buffer.interleaved().len(), 2048);
    }

    #[test]
    #[should_panic(expected = "no planar buffers")]
    fn test_wrong_accessor_panics() {
        let buffer = TransferBuffer::new(&StreamConfig::default());
        let _ = buffer.planar();
    }
}
