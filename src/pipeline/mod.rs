//! Outer playback and capture loops.
//!
//! These drive the transfer engine from end to end: byte-stream source or
//! sink on one side, the chunked device transfer loop on the other, with
//! limit accounting, capture-file rotation and cooperative abort in
//! between.

mod capture;
mod playback;

pub use capture::{capture, capture_planar, capture_to};
pub use playback::{playback, playback_planar};

use std::io::{self, Read};
use std::path::PathBuf;

use crate::error::StreamError;
use crate::session::SessionFlags;

/// Resolves the file-per-channel names for planar ("separate channels")
/// mode.
///
/// A single base name is auto-expanded to `name.0`, `name.1`, ...;
/// otherwise exactly one name per channel must be given.
pub fn channel_file_names(
    given: &[String],
    channels: usize,
) -> Result<Vec<PathBuf>, StreamError> {
    if given.len() == 1 && channels > 1 {
        Ok((0..channels)
            .map(|ch| PathBuf::from(format!("{}.{}", given[0], ch)))
            .collect())
    } else if given.len() == channels {
        Ok(given.iter().map(PathBuf::from).collect())
    } else {
        Err(StreamError::config(format!(
            "you need to specify {} files, got {}",
            channels,
            given.len()
        )))
    }
}

/// Reads until `buf` is full, the stream ends, or an abort is requested.
///
/// Short reads from pipes are retried; a read error after partial progress
/// reports the progress (the error will resurface on the next call).
pub(crate) fn read_full<R: Read>(
    input: &mut R,
    buf: &mut [u8],
    flags: &SessionFlags,
) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() && !flags.is_aborted() {
        match input.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) if total > 0 => break,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_name_expands_per_channel() {
        let names = channel_file_names(&["out.raw".to_string()], 3).unwrap();
        assert_eq!(
            names,
            vec![
                PathBuf::from("out.raw.0"),
                PathBuf::from("out.raw.1"),
                PathBuf::from("out.raw.2")
            ]
        );
    }

    #[test]
    fn test_exact_name_count_passes_through() {
        let given = vec!["l.raw".to_string(), "r.raw".to_string()];
        let names = channel_file_names(&given, 2).unwrap();
        assert_eq!(names, vec![PathBuf::from("l.raw"), PathBuf::from("r.raw")]);
    }

    #[test]
    fn test_wrong_name_count_rejected() {
        let given = vec!["a".to_string(), "b".to_string()];
        assert!(channel_file_names(&given, 3).is_err());
    }

    #[test]
    fn test_read_full_stops_at_eof() {
        let flags = SessionFlags::new();
        let mut input: &[u8] = b"abc";
        let mut buf = [0u8; 8];
        let n = read_full(&mut input, &mut buf, &flags).unwrap();
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_read_full_honors_abort() {
        let flags = SessionFlags::new();
        flags.abort();
        let mut input: &[u8] = b"abcdef";
        let mut buf = [0u8; 4];
        let n = read_full(&mut input, &mut buf, &flags).unwrap();
        assert_eq!(n, 0);
    }
}
