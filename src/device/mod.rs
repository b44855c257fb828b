//! The PCM device collaborator boundary.
//!
//! The engine never talks to hardware directly: everything it needs from a
//! device is expressed by the [`PcmDevice`] trait. Production code uses the
//! ALSA-backed implementation (feature `alsa-backend`); tests drive the
//! engine with the scriptable [`MockDevice`](mock::MockDevice).

pub mod mock;

#[cfg(feature = "alsa-backend")]
pub mod alsa;

use std::time::Duration;

pub use crate::error::DeviceError;

/// Coarse device state as reported by status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmState {
    /// Configured and ready to transfer.
    Prepared,
    /// Actively transferring.
    Running,
    /// Buffer underrun (playback) or overrun (capture).
    Xrun,
    /// Playing out remaining queued frames.
    Draining,
    /// Paused by the pause primitive.
    Paused,
    /// Power-management suspend.
    Suspended,
    /// Device went away.
    Disconnected,
}

impl PcmState {
    /// Stable name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Prepared => "PREPARED",
            Self::Running => "RUNNING",
            Self::Xrun => "XRUN",
            Self::Draining => "DRAINING",
            Self::Paused => "PAUSED",
            Self::Suspended => "SUSPENDED",
            Self::Disconnected => "DISCONNECTED",
        }
    }
}

/// Snapshot of device counters, read by the position monitor and the fault
/// recovery path. Owned by the device layer, only queried by the engine.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    /// Device state at snapshot time.
    pub state: PcmState,
    /// Frames available for the next transfer.
    pub avail: i64,
    /// Capture: frames recorded but not yet drained to the caller.
    /// Playback: frames queued but not yet sounded.
    pub delay: i64,
    /// Time elapsed since the fault trigger timestamp, when the device is in
    /// a fault state and can report it (computed with the device's own
    /// monotonic or wall clock).
    pub trigger_elapsed: Option<Duration>,
}

/// Result of one device I/O call that did not hard-fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    /// This many frames were transferred (possibly fewer than requested,
    /// possibly zero).
    Transferred(usize),
    /// Nothing transferred; the device wants the caller to wait.
    WouldBlock,
    /// The device hit an underrun/overrun; recover and retry.
    Xrun,
    /// The device suspended; resume and retry.
    Suspended,
}

/// Result of a resume attempt on a suspended device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// Resume completed; the device is usable again.
    Resumed,
    /// The suspend flag is still set; sleep and retry.
    Retry,
    /// Resume is not possible; the device must be re-primed.
    Failed,
}

/// Abstract PCM device.
///
/// Implementations map transient transfer faults onto [`IoOutcome`] values
/// and reserve `Err` for failures the engine treats as fatal. The
/// interleaved/planar split mirrors the classic primitive families; which
/// one the engine calls is fixed by the negotiated
/// [`AccessMode`](crate::AccessMode), and whether transfers are buffered or
/// memory-mapped is the backend's business, chosen once at open time.
pub trait PcmDevice {
    /// Writes up to `frames` interleaved frames from `buf`.
    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<IoOutcome, DeviceError>;

    /// Reads up to `frames` interleaved frames into `buf`.
    fn readi(&mut self, buf: &mut [u8], frames: usize) -> Result<IoOutcome, DeviceError>;

    /// Writes up to `frames` frames from one buffer per channel.
    fn writen(&mut self, bufs: &[&[u8]], frames: usize) -> Result<IoOutcome, DeviceError>;

    /// Reads up to `frames` frames into one buffer per channel.
    fn readn(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<IoOutcome, DeviceError>;

    /// Cheap non-blocking query of (available, delay) frame counters.
    fn avail_delay(&mut self) -> Result<(i64, i64), DeviceError>;

    /// Full status snapshot.
    fn status(&mut self) -> Result<DeviceStatus, DeviceError>;

    /// Current coarse state.
    fn state(&mut self) -> PcmState;

    /// Re-primes the device into a ready-to-transfer state after a fault.
    fn prepare(&mut self) -> Result<(), DeviceError>;

    /// Attempts to resume a suspended device.
    fn resume(&mut self) -> ResumeOutcome;

    /// Pauses (`true`) or unpauses (`false`) the stream.
    fn pause(&mut self, enable: bool) -> Result<(), DeviceError>;

    /// Plays out queued frames before stopping (playback shutdown).
    fn drain(&mut self) -> Result<(), DeviceError>;

    /// Waits up to `timeout_ms` for the device to become ready.
    ///
    /// Returns `true` when the device signalled readiness.
    fn wait(&mut self, timeout_ms: i32) -> Result<bool, DeviceError>;

    /// Whether the hardware supports the pause primitive.
    fn can_pause(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(PcmState::Xrun.name(), "XRUN");
        assert_eq!(PcmState::Suspended.name(), "SUSPENDED");
        assert_eq!(PcmState::Draining.name(), "DRAINING");
    }

    #[test]
    fn test_io_outcome_equality() {
        assert_eq!(IoOutcome::Transferred(5), IoOutcome::Transferred(5));
        assert_ne!(IoOutcome::Transferred(5), IoOutcome::WouldBlock);
    }
}
