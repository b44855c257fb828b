//! Playback: byte stream → device.

use std::io::Read;

use crate::config::TransferLimit;
use crate::device::PcmDevice;
use crate::error::StreamError;
use crate::pipeline::read_full;
use crate::session::StreamSession;

/// Plays an interleaved raw stream until the limit is reached, the input
/// ends, or an abort is requested.
///
/// Returns the number of input bytes delivered to the device (padding
/// excluded). The device is drained at the end unless the session was
/// aborted, so queued audio is fully sounded before return.
pub fn playback<D: PcmDevice, R: Read>(
    session: &mut StreamSession<D>,
    input: &mut R,
    name: &str,
    limit: TransferLimit,
) -> Result<u64, StreamError> {
    let chunk_bytes = session.config().chunk_bytes() as u64;
    let bpf = session.config().bytes_per_frame();
    let flags = session.flags();
    let count = limit.byte_count(session.config());

    let mut written: u64 = 0;
    while written < count && !flags.is_aborted() {
        let want = (count - written).min(chunk_bytes) as usize;
        let got = read_full(input, &mut session.buffer.interleaved_mut()[..want], &flags)
            .map_err(|e| StreamError::file(name, e))?;
        if got == 0 {
            break;
        }
        let frames = got / bpf;
        if frames == 0 {
            // ragged tail shorter than one frame
            break;
        }
        let result = session.write_frames(frames)?;
        written += (result.min(frames) * bpf) as u64;
        if result != frames {
            // padded final chunk or early termination
            break;
        }
    }

    if !flags.is_aborted() {
        session.drain()?;
    }
    Ok(written)
}

/// Plays one raw stream per channel (planar mode).
///
/// The first input drives the pace; every other input must supply exactly
/// as many bytes per round or the stream is considered broken.
pub fn playback_planar<D: PcmDevice, R: Read>(
    session: &mut StreamSession<D>,
    inputs: &mut [R],
    names: &[std::path::PathBuf],
    limit: TransferLimit,
) -> Result<u64, StreamError> {
    let channels = session.config().channels;
    debug_assert_eq!(inputs.len(), channels);
    let bps = session.config().format.bytes_per_sample();
    let bpf = session.config().bytes_per_frame() as u64;
    let per_channel = session.config().chunk_frames * bps;
    let flags = session.flags();
    let mut count = limit.byte_count(session.config());

    let mut written: u64 = 0;
    while count > 0 && !flags.is_aborted() {
        let expected = ((count / channels as u64).min(per_channel as u64)) as usize;
        if expected < bps {
            break;
        }

        let lead = {
            let buf = &mut session.buffer.planar_mut()[0][..expected];
            read_full(&mut inputs[0], buf, &flags)
                .map_err(|e| StreamError::file(&names[0], e))?
        };
        if lead == 0 {
            break;
        }
        for channel in 1..channels {
            let got = {
                let buf = &mut session.buffer.planar_mut()[channel][..lead];
                read_full(&mut inputs[channel], buf, &flags)
                    .map_err(|e| StreamError::file(&names[channel], e))?
            };
            if got != lead {
                return Err(StreamError::file(
                    &names[channel],
                    std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "channel file ended early",
                    ),
                ));
            }
        }

        let frames = lead / bps;
        let result = session.write_frames_planar(frames)?;
        written += result.min(frames) as u64 * bpf;
        if result != frames {
            break;
        }
        count = count.saturating_sub(result as u64 * bpf);
    }

    if !flags.is_aborted() {
        session.drain()?;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessMode, Direction, StreamConfig};
    use crate::device::mock::MockDevice;
    use crate::session::{SessionOptions, StreamSession};

    fn session(config: StreamConfig) -> StreamSession<MockDevice> {
        let device = MockDevice::new(&config);
        StreamSession::new(device, config, SessionOptions::default()).unwrap()
    }

    #[test]
    fn test_playback_whole_chunks() {
        let mut s = session(StreamConfig::default());
        let data = vec![0x11u8; 2048]; // two exact chunks
        let written = playback(&mut s, &mut &data[..], "mem", TransferLimit::Unlimited).unwrap();
        assert_eq!(written, 2048);
        assert_eq!(s.device().written().len(), 2048);
        assert!(s.device().drained());
    }

    #[test]
    fn test_playback_pads_final_partial_chunk() {
        let mut s = session(StreamConfig::default());
        let data = vec![0x22u8; 1500];
        let written = playback(&mut s, &mut &data[..], "mem", TransferLimit::Unlimited).unwrap();
        assert_eq!(written, 1500);
        // device received the content plus silence padding to a whole chunk
        let device_bytes = s.device().written();
        assert_eq!(device_bytes.len(), 2048);
        assert!(device_bytes[..1500].iter().all(|&b| b == 0x22));
        assert!(device_bytes[1500..].iter().all(|&b| b == 0x80));
    }

    #[test]
    fn test_playback_respects_duration_limit() {
        // 8000 Hz, 1 byte per frame → 2 s == 16000 bytes
        let mut s = session(StreamConfig::default());
        let data = vec![0u8; 24_000]; // 3 s of input
        let written =
            playback(&mut s, &mut &data[..], "mem", TransferLimit::Seconds(2)).unwrap();
        assert_eq!(written, 16_000);
        assert_eq!(s.device().written().len(), 16_000);
    }

    #[test]
    fn test_playback_abort_skips_drain() {
        let mut s = session(StreamConfig::default());
        s.flags().abort();
        let data = vec![0u8; 4096];
        let written = playback(&mut s, &mut &data[..], "mem", TransferLimit::Unlimited).unwrap();
        assert_eq!(written, 0);
        assert!(!s.device().drained());
    }

    #[test]
    fn test_planar_playback_splits_channels() {
        let config = StreamConfig {
            channels: 2,
            access: AccessMode::Planar,
            direction: Direction::Playback,
            ..StreamConfig::default()
        };
        let mut s = session(config);
        let left = vec![0x01u8; 1024];
        let right = vec![0x02u8; 1024];
        let mut inputs = vec![&left[..], &right[..]];
        let names = vec!["l".into(), "r".into()];
        let written =
            playback_planar(&mut s, &mut inputs, &names, TransferLimit::Unlimited).unwrap();
        assert_eq!(written, 2048); // 1024 frames × 2 bytes per frame
        assert!(s.device().written_planar()[0].iter().all(|&b| b == 0x01));
        assert!(s.device().written_planar()[1].iter().all(|&b| b == 0x02));
    }

    #[test]
    fn test_planar_playback_rejects_short_channel() {
        let config = StreamConfig {
            channels: 2,
            access: AccessMode::Planar,
            ..StreamConfig::default()
        };
        let mut s = session(config);
        let left = vec![0u8; 1024];
        let right = vec![0u8; 100]; // too short
        let mut inputs = vec![&left[..], &right[..]];
        let names = vec!["l".into(), "r".into()];
        let err = playback_planar(&mut s, &mut inputs, &names, TransferLimit::Unlimited);
        assert!(err.is_err());
    }
}
