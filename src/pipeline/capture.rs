//! Capture: device → byte stream, with output-file rotation.

use std::io::Write;

use crate::config::TransferLimit;
use crate::device::PcmDevice;
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::rotate::CaptureFileSeries;
use crate::session::StreamSession;

/// Captures into a rotating file series until the limit is reached or an
/// abort is requested.
///
/// Rotation happens when whichever fires first: the series' per-file byte
/// budget, or an external rotation request observed once per chunk. A
/// rotation closes the current file, opens the next one and resets only the
/// per-file accounting - the overall limit keeps counting down across
/// files. Returns total bytes captured.
pub fn capture<D: PcmDevice>(
    session: &mut StreamSession<D>,
    series: &mut CaptureFileSeries,
    limit: TransferLimit,
) -> Result<u64, StreamError> {
    let chunk_bytes = session.config().chunk_bytes() as u64;
    let bpf = session.config().bytes_per_frame() as u64;
    let flags = session.flags();
    let unlimited = limit == TransferLimit::Unlimited;
    // whole frames only: a trailing partial frame cannot be captured
    let mut count = limit.byte_count(session.config());
    count -= count % bpf;

    let mut total: u64 = 0;
    loop {
        let (mut file, path) = series.open_next()?;
        session.stats.files_written += 1;
        if series.files_opened() > 1 {
            session.emit(StreamEvent::FileRotated {
                path: path.clone(),
                index: series.files_opened(),
            });
        }

        let mut rest = count;
        while rest > 0
            && !flags.rotate_pending()
            && !flags.is_aborted()
            && !series.size_exceeded()
        {
            let mut c = rest.min(chunk_bytes);
            if let Some(remaining) = series.remaining_in_file() {
                c = c.min(remaining);
            }
            let frames = (c / bpf) as usize;
            if frames == 0 {
                if series.bytes_in_file() == 0 {
                    return Err(StreamError::config(
                        "per-file size limit is smaller than one frame",
                    ));
                }
                // frame-unaligned byte budget: rotate a little early
                break;
            }

            let read = session.read_frames(frames)?;
            let bytes = read as u64 * bpf;
            file.write_all(&session.buffer.interleaved()[..bytes as usize])
                .map_err(|e| StreamError::file(&path, e))?;
            series.note_written(bytes);
            count -= bytes;
            rest -= bytes;
            total += bytes;

            if read != frames {
                // short read: the transfer loop observed an abort
                flags.abort();
            }
        }
        // consume the rotation request that may have ended the inner loop
        let _ = flags.take_rotate();
        drop(file);

        if flags.is_aborted() || !(unlimited || count > 0) {
            break;
        }
    }
    Ok(total)
}

/// Captures into one fixed writer (stdout mode) - no rotation.
pub fn capture_to<D: PcmDevice, W: Write>(
    session: &mut StreamSession<D>,
    out: &mut W,
    name: &str,
    limit: TransferLimit,
) -> Result<u64, StreamError> {
    let chunk_bytes = session.config().chunk_bytes() as u64;
    let bpf = session.config().bytes_per_frame() as u64;
    let flags = session.flags();
    let mut rest = limit.byte_count(session.config());
    rest -= rest % bpf;

    let mut total: u64 = 0;
    while rest > 0 && !flags.is_aborted() {
        let c = rest.min(chunk_bytes);
        let frames = (c / bpf) as usize;
        let read = session.read_frames(frames)?;
        let bytes = read as u64 * bpf;
        out.write_all(&session.buffer.interleaved()[..bytes as usize])
            .map_err(|e| StreamError::file(name, e))?;
        rest -= bytes;
        total += bytes;
        if read != frames {
            break;
        }
    }
    Ok(total)
}

/// Captures one raw stream per channel (planar mode) - no rotation.
pub fn capture_planar<D: PcmDevice, W: Write>(
    session: &mut StreamSession<D>,
    outs: &mut [W],
    names: &[std::path::PathBuf],
    limit: TransferLimit,
) -> Result<u64, StreamError> {
    let channels = session.config().channels;
    debug_assert_eq!(outs.len(), channels);
    let chunk_bytes = session.config().chunk_bytes() as u64;
    let bps = session.config().format.bytes_per_sample();
    let bpf = session.config().bytes_per_frame() as u64;
    let flags = session.flags();
    let mut rest = limit.byte_count(session.config());
    rest -= rest % bpf;

    let mut total: u64 = 0;
    while rest > 0 && !flags.is_aborted() {
        let c = rest.min(chunk_bytes);
        let frames = (c / bpf) as usize;
        let read = session.read_frames_planar(frames)?;
        let per_channel = read * bps;
        for (channel, out) in outs.iter_mut().enumerate() {
            out.write_all(&session.buffer.planar()[channel][..per_channel])
                .map_err(|e| StreamError::file(&names[channel], e))?;
        }
        let bytes = read as u64 * bpf;
        rest -= bytes;
        total += bytes;
        if read != frames {
            break;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccessMode, Direction, StreamConfig};
    use crate::device::mock::MockDevice;
    use crate::rotate::NamePolicy;
    use crate::session::{SessionOptions, StreamSession};
    use tempfile::tempdir;

    fn capture_session() -> StreamSession<MockDevice> {
        let config = StreamConfig {
            direction: Direction::Capture,
            ..StreamConfig::default()
        };
        let device = MockDevice::new(&config);
        StreamSession::new(device, config, SessionOptions::default()).unwrap()
    }

    #[test]
    fn test_capture_single_file_with_limit() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("rec.raw");
        let mut session = capture_session();
        let mut series = CaptureFileSeries::new(&base, NamePolicy::Counter, None);

        // 8000 Hz × 1 byte per frame × 1 s
        let total = capture(&mut session, &mut series, TransferLimit::Seconds(1)).unwrap();
        assert_eq!(total, 8000);
        assert_eq!(series.files_opened(), 1);
        assert_eq!(std::fs::metadata(&base).unwrap().len(), 8000);
    }

    #[test]
    fn test_capture_rotates_on_size_budget() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("rec.raw");
        let mut session = capture_session();
        // one-second budget at 8000 B/s
        let mut series =
            CaptureFileSeries::with_max_file_time(&base, NamePolicy::Counter, 1, 8000);

        // 2.5 seconds of capture
        let total =
            capture(&mut session, &mut series, TransferLimit::Samples(20_000)).unwrap();
        assert_eq!(total, 20_000);
        assert_eq!(series.files_opened(), 3);

        let sizes = [
            std::fs::metadata(dir.path().join("rec-01.raw")).unwrap().len(),
            std::fs::metadata(dir.path().join("rec-02.raw")).unwrap().len(),
            std::fs::metadata(dir.path().join("rec-03.raw")).unwrap().len(),
        ];
        assert_eq!(sizes, [8000, 8000, 4000]);
        assert!(!base.exists());
    }

    #[test]
    fn test_capture_no_frames_lost_across_rotation() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("rec.raw");
        let mut session = capture_session();
        let mut series =
            CaptureFileSeries::with_max_file_time(&base, NamePolicy::Counter, 1, 8000);

        capture(&mut session, &mut series, TransferLimit::Samples(16_000)).unwrap();

        // the mock stamps a running counter into every frame: concatenating
        // the files must reproduce it without gaps or repeats
        let mut all = Vec::new();
        all.extend(std::fs::read(dir.path().join("rec-01.raw")).unwrap());
        all.extend(std::fs::read(dir.path().join("rec-02.raw")).unwrap());
        assert_eq!(all.len(), 16_000);
        for (i, &b) in all.iter().enumerate() {
            assert_eq!(b, i as u8, "frame {}", i);
        }
    }

    #[test]
    fn test_capture_to_writer() {
        let mut session = capture_session();
        let mut out = Vec::new();
        let total =
            capture_to(&mut session, &mut out, "stdout", TransferLimit::Samples(4096)).unwrap();
        assert_eq!(total, 4096);
        assert_eq!(out.len(), 4096);
    }

    #[test]
    fn test_capture_abort_keeps_partial_output() {
        let mut session = capture_session();
        session.flags().abort();
        let mut out = Vec::new();
        let total =
            capture_to(&mut session, &mut out, "stdout", TransferLimit::Samples(4096)).unwrap();
        assert_eq!(total, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_capture_planar_one_file_per_channel() {
        let config = StreamConfig {
            direction: Direction::Capture,
            channels: 2,
            access: AccessMode::Planar,
            ..StreamConfig::default()
        };
        let device = MockDevice::new(&config);
        let mut session =
            StreamSession::new(device, config, SessionOptions::default()).unwrap();

        let mut outs = vec![Vec::new(), Vec::new()];
        let names = vec!["a".into(), "b".into()];
        let total =
            capture_planar(&mut session, &mut outs, &names, TransferLimit::Samples(1024))
                .unwrap();
        assert_eq!(total, 2048); // 1024 frames × 2 bytes
        assert_eq!(outs[0].len(), 1024);
        assert_eq!(outs[1].len(), 1024);
    }
}
