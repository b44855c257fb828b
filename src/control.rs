//! Interactive pause/resume control.
//!
//! When enabled, the transfer loop polls for keystrokes at safe points and
//! a space or carriage return toggles a cooperative pause. Keystrokes come
//! through the [`KeySource`] trait so the engine stays testable - the
//! raw-terminal implementation lives with the binary, tests use
//! [`ScriptedKeys`].

use std::collections::VecDeque;
use std::io::{self, Write};

use crate::device::{PcmDevice, PcmState};
use crate::error::StreamError;
use crate::event::{EventCallback, StreamEvent};
use crate::recovery;

/// Source of interactive keystrokes.
pub trait KeySource {
    /// Returns a pending keystroke without blocking, if any.
    fn poll_key(&mut self) -> Option<u8>;

    /// Blocks until a keystroke is available.
    fn wait_key(&mut self) -> io::Result<u8>;
}

/// A canned keystroke sequence for tests.
#[derive(Debug, Default)]
pub struct ScriptedKeys {
    keys: VecDeque<u8>,
}

impl ScriptedKeys {
    /// Creates a source that will deliver the given bytes in order.
    pub fn new(keys: &[u8]) -> Self {
        Self {
            keys: keys.iter().copied().collect(),
        }
    }
}

impl KeySource for ScriptedKeys {
    fn poll_key(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }

    fn wait_key(&mut self) -> io::Result<u8> {
        self.keys.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::UnexpectedEof, "key script exhausted")
        })
    }
}

/// Cooperative pause/resume driven by keystroke polling.
///
/// Interposed into the transfer loop at safe points: the loop calls
/// [`check`](Self::check) once per iteration, and a pause blocks right
/// there until the release key arrives - the device call in flight has
/// already completed.
pub struct InteractiveControl {
    keys: Box<dyn KeySource>,
}

impl InteractiveControl {
    /// Creates a control reading from the given key source.
    pub fn new(keys: Box<dyn KeySource>) -> Self {
        Self { keys }
    }

    /// Drains pending keystrokes and services a pause request if one
    /// arrived.
    pub fn check<D: PcmDevice>(
        &mut self,
        device: &mut D,
        quiet: bool,
        events: Option<&EventCallback>,
    ) -> Result<(), StreamError> {
        while let Some(key) = self.keys.poll_key() {
            if key == b' ' || key == b'\r' {
                eprint!("\r=== PAUSE ===  ");
                let _ = io::stderr().flush();
                self.pause(device, quiet, events)?;
                eprint!("\r               \r");
                let _ = io::stderr().flush();
            }
        }
        Ok(())
    }

    fn pause<D: PcmDevice>(
        &mut self,
        device: &mut D,
        quiet: bool,
        events: Option<&EventCallback>,
    ) -> Result<(), StreamError> {
        if !device.can_pause() {
            eprintln!("\rPAUSE command ignored (no hw support)");
            return Ok(());
        }
        if device.state() == PcmState::Suspended {
            recovery::recover_suspend(device, quiet)?;
        }

        if let Err(err) = device.pause(true) {
            tracing::warn!(%err, "pause push failed");
            return Ok(());
        }
        emit(events, StreamEvent::Paused);

        loop {
            match self.keys.wait_key() {
                Ok(b' ') | Ok(b'\r') => break,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(%err, "pause wait interrupted, resuming");
                    break;
                }
            }
        }
        // drain the release key's repeats as well
        while self.keys.poll_key().is_some() {}

        if device.state() == PcmState::Suspended {
            recovery::recover_suspend(device, quiet)?;
        }
        if let Err(err) = device.pause(false) {
            tracing::warn!(%err, "pause release failed");
        }
        emit(events, StreamEvent::Resumed);
        Ok(())
    }
}

fn emit(events: Option<&EventCallback>, event: StreamEvent) {
    if let Some(callback) = events {
        callback(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::device::mock::MockDevice;

    #[test]
    fn test_no_keys_is_a_no_op() {
        let mut control = InteractiveControl::new(Box::new(ScriptedKeys::default()));
        let mut device = MockDevice::new(&StreamConfig::default());
        control.check(&mut device, true, None).unwrap();
        assert!(!device.is_paused());
    }

    #[test]
    fn test_space_pauses_and_resumes() {
        // pause on the first space, release on the second
        let mut control = InteractiveControl::new(Box::new(ScriptedKeys::new(b"  ")));
        let mut device = MockDevice::new(&StreamConfig::default());
        control.check(&mut device, true, None).unwrap();
        // both keys consumed: paused then released
        assert!(!device.is_paused());
    }

    #[test]
    fn test_other_keys_ignored() {
        let mut control = InteractiveControl::new(Box::new(ScriptedKeys::new(b"xyz")));
        let mut device = MockDevice::new(&StreamConfig::default());
        control.check(&mut device, true, None).unwrap();
        assert!(!device.is_paused());
    }

    #[test]
    fn test_pause_without_hw_support_is_ignored() {
        let mut control = InteractiveControl::new(Box::new(ScriptedKeys::new(b" ")));
        let mut device = MockDevice::new(&StreamConfig::default()).without_pause_support();
        control.check(&mut device, true, None).unwrap();
        assert!(!device.is_paused());
    }

    #[test]
    fn test_pause_emits_events() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback = crate::event::event_callback(move |event| {
            if matches!(event, StreamEvent::Paused | StreamEvent::Resumed) {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut control = InteractiveControl::new(Box::new(ScriptedKeys::new(b" \r")));
        let mut device = MockDevice::new(&StreamConfig::default());
        control.check(&mut device, true, Some(&callback)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
