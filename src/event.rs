//! Runtime events for observing stream health.
//!
//! Events are non-fatal notifications: the stream keeps running after every
//! one of them. They exist for logging and user feedback - the binary's
//! callback prints the classic stderr lines, embedders can count or route
//! them instead.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Runtime events emitted during a stream session.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The device reported an underrun (playback) or overrun (capture) and
    /// was re-primed; the interrupted chunk will be retried.
    XrunRecovered {
        /// Time since the fault trigger, when the device could report it.
        elapsed: Option<Duration>,
        /// `underrun` or `overrun`, depending on direction.
        fault: &'static str,
    },

    /// The device suspended and was resumed (or re-primed after a failed
    /// resume); the interrupted chunk will be retried.
    SuspendRecovered {
        /// Whether plain resume worked or the device had to be re-primed.
        reprimed: bool,
    },

    /// A capture attempt found the device draining - usually a stream
    /// format change - and the device was re-primed.
    CaptureRebound,

    /// The buffer-position monitor saw a value outside its envelope.
    SuspiciousPosition {
        /// Running count of suspicious observations this session.
        total: u64,
        /// Reported available frames.
        avail: i64,
        /// Reported delay frames.
        delay: i64,
    },

    /// Capture output rotated to a new file.
    FileRotated {
        /// Path of the newly opened file.
        path: PathBuf,
        /// One-based index of the new file in the series.
        index: u32,
    },

    /// Interactive pause engaged.
    Paused,

    /// Interactive pause released.
    Resumed,
}

/// Callback type for receiving runtime events.
pub type EventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure without manual `Arc` wrapping.
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(StreamEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_event_debug_format() {
        let event = StreamEvent::XrunRecovered {
            elapsed: Some(Duration::from_millis(12)),
            fault: "underrun",
        };
        let debug = format!("{:?}", event);
        assert!(debug.contains("XrunRecovered"));
        assert!(debug.contains("underrun"));
    }

    #[test]
    fn test_event_callback_helper() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let callback = event_callback(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        callback(StreamEvent::Paused);
        callback(StreamEvent::Resumed);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
