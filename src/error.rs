//! Error types for pcm-stream.
//!
//! Errors are split into two layers:
//! - [`DeviceError`]: a failed device-collaborator call. The transfer loop
//!   sees transient conditions (would-block, xrun, suspend) as
//!   [`IoOutcome`](crate::IoOutcome) values, so a `DeviceError` is always
//!   the "any other negative result" case - fatal by the time it surfaces.
//! - [`StreamError`]: fatal session errors. All of these funnel through a
//!   single cleanup-and-exit path in the binary.

use std::path::PathBuf;

/// A failed call into the device collaborator.
///
/// Carries the primitive that failed so the fatal log line can name it the
/// way the classic tools did (`write error: ...`).
#[derive(Debug, thiserror::Error)]
#[error("{op} error: {message}")]
pub struct DeviceError {
    /// Name of the device primitive that failed.
    pub op: &'static str,
    /// Backend-provided failure description.
    pub message: String,
}

impl DeviceError {
    /// Creates a device error for the given primitive.
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Fatal errors that terminate a stream session.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Bad parameters, or the device cannot satisfy the requested
    /// configuration.
    #[error("configuration error: {reason}")]
    Config {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// A file-side read/write/open failure, reported with the offending
    /// path.
    #[error("{path}: {source}")]
    File {
        /// Path of the file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An unrecoverable device failure.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The device was left in a state no recovery path handles.
    #[error("read/write error, state = {state}")]
    BadState {
        /// Name of the offending device state.
        state: &'static str,
    },

    /// A transient fault escalated because fatal-errors mode is set.
    #[error("fatal {fault}")]
    FatalFault {
        /// The fault that was escalated (`underrun` or `overrun`).
        fault: &'static str,
    },

    /// A capture-file name pattern expanded to nothing usable.
    #[error("file name pattern '{pattern}' produced no output")]
    Pattern {
        /// The offending pattern.
        pattern: String,
    },
}

impl StreamError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}
