//! Fault recovery state machines.
//!
//! Invoked by the transfer loop when a device call reports a fault code.
//! Both paths end with the device re-primed (or resumed) and signal "retry
//! the same request" to the caller - the failed chunk's position is never
//! advanced. A status-query failure during recovery is fatal: the device
//! state can no longer be trusted.

use std::thread;
use std::time::Duration;

use crate::config::Direction;
use crate::device::{PcmDevice, PcmState, ResumeOutcome};
use crate::error::StreamError;
use crate::session::SessionOptions;

/// What an xrun recovery pass found and fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum XrunRecovery {
    /// A genuine underrun/overrun was cleared.
    Xrun {
        /// Time since the fault trigger, when the device reported it.
        elapsed: Option<Duration>,
    },
    /// A capture attempt found the device draining (stream format change)
    /// and re-primed it.
    CaptureRebound,
}

/// Names the fault for the current direction.
pub(crate) fn fault_name(direction: Direction) -> &'static str {
    match direction {
        Direction::Playback => "underrun",
        Direction::Capture => "overrun",
    }
}

/// Clears an underrun/overrun (or a draining capture device).
///
/// Mirrors the classic recovery sequence: query status (failure here is
/// fatal), escalate when fatal-errors mode is set, log how long the fault
/// lasted, optionally dump the full status, then re-prime the device so
/// data is accepted again. Any state outside the two recoverable cases is
/// fatal.
pub(crate) fn recover_xrun<D: PcmDevice>(
    device: &mut D,
    direction: Direction,
    opts: &SessionOptions,
) -> Result<XrunRecovery, StreamError> {
    let status = device.status()?;

    match status.state {
        PcmState::Xrun => {
            if opts.fatal_errors {
                return Err(StreamError::FatalFault {
                    fault: fault_name(direction),
                });
            }
            let elapsed_ms = status
                .trigger_elapsed
                .map(|d| d.as_secs_f64() * 1000.0)
                .unwrap_or(0.0);
            tracing::warn!(
                elapsed_ms = %format_args!("{:.3}", elapsed_ms),
                "{}!!!",
                fault_name(direction)
            );
            if opts.verbose > 0 {
                tracing::debug!(?status, "status after xrun");
            }
            device.prepare()?;
            Ok(XrunRecovery::Xrun {
                elapsed: status.trigger_elapsed,
            })
        }
        PcmState::Draining if direction == Direction::Capture => {
            if opts.verbose > 0 {
                tracing::debug!(?status, "status while draining");
            }
            tracing::warn!("capture stream format change? attempting recover");
            device.prepare()?;
            Ok(XrunRecovery::CaptureRebound)
        }
        other => Err(StreamError::BadState { state: other.name() }),
    }
}

/// Rides out a device suspend.
///
/// Blocks - intentionally, and possibly for a long time - retrying resume
/// once per second while the device still reports the suspend flag. A
/// definitive resume failure falls back to re-priming. Returns whether the
/// fallback was taken.
pub(crate) fn recover_suspend<D: PcmDevice>(
    device: &mut D,
    quiet: bool,
) -> Result<bool, StreamError> {
    if !quiet {
        tracing::warn!("device suspended, trying resume");
    }
    loop {
        match device.resume() {
            ResumeOutcome::Resumed => {
                if !quiet {
                    tracing::info!("resume done");
                }
                return Ok(false);
            }
            ResumeOutcome::Retry => thread::sleep(Duration::from_secs(1)),
            ResumeOutcome::Failed => break,
        }
    }
    if !quiet {
        tracing::warn!("resume failed, restarting stream");
    }
    device.prepare()?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::device::mock::{IoStep, MockDevice};

    fn xrun_device() -> MockDevice {
        let config = StreamConfig::default();
        let mut device = MockDevice::new(&config);
        device.push_step(IoStep::Xrun);
        let mut buf = [0u8; 8];
        // drive the device into the xrun state
        let _ = device.readi(&mut buf, 8);
        device
    }

    #[test]
    fn test_xrun_reprimes_device() {
        let mut device = xrun_device();
        let opts = SessionOptions::default();
        let outcome = recover_xrun(&mut device, Direction::Playback, &opts).unwrap();
        assert!(matches!(outcome, XrunRecovery::Xrun { elapsed: Some(_) }));
        assert_eq!(device.prepare_count(), 1);
        assert_eq!(device.state(), PcmState::Prepared);
    }

    #[test]
    fn test_xrun_fatal_errors_mode_escalates() {
        let mut device = xrun_device();
        let opts = SessionOptions {
            fatal_errors: true,
            ..SessionOptions::default()
        };
        let err = recover_xrun(&mut device, Direction::Playback, &opts).unwrap_err();
        assert!(matches!(
            err,
            StreamError::FatalFault { fault: "underrun" }
        ));
        assert_eq!(device.prepare_count(), 0);
    }

    #[test]
    fn test_overrun_named_for_capture() {
        assert_eq!(fault_name(Direction::Capture), "overrun");
        assert_eq!(fault_name(Direction::Playback), "underrun");
    }

    #[test]
    fn test_unexpected_state_is_fatal() {
        let config = StreamConfig::default();
        let mut device = MockDevice::new(&config);
        // device is happily prepared - recovery was called for no reason
        let err = recover_xrun(&mut device, Direction::Playback, &SessionOptions::default())
            .unwrap_err();
        assert!(matches!(err, StreamError::BadState { .. }));
    }

    #[test]
    fn test_suspend_resume_success() {
        let config = StreamConfig::default();
        let mut device = MockDevice::new(&config);
        let reprimed = recover_suspend(&mut device, true).unwrap();
        assert!(!reprimed);
        assert_eq!(device.prepare_count(), 0);
    }

    #[test]
    fn test_suspend_resume_failure_reprimes() {
        let config = StreamConfig::default();
        let mut device = MockDevice::new(&config);
        device.push_resume(ResumeOutcome::Failed);
        let reprimed = recover_suspend(&mut device, true).unwrap();
        assert!(reprimed);
        assert_eq!(device.prepare_count(), 1);
    }
}
