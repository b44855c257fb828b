//! Ring-buffer position sanity monitoring.
//!
//! Around every device I/O call (when enabled) the monitor reads the
//! available/delay frame counters twice - once through the cheap
//! non-blocking query and once from the full status snapshot - and compares
//! both pairs against an expected envelope. Everything here is purely
//! observational: suspicious values are logged and counted, never acted on.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Direction;
use crate::device::PcmDevice;
use crate::event::StreamEvent;

/// Accumulated min/max/avg over the most recent window of sane readings.
#[derive(Debug, Clone)]
struct Window {
    avail_sum: f64,
    delay_sum: f64,
    samples: f64,
    max_avail: i64,
    max_delay: i64,
    min_avail: i64,
    min_delay: i64,
}

impl Window {
    fn cleared(buffer_frames: i64) -> Self {
        Self {
            avail_sum: 0.0,
            delay_sum: 0.0,
            samples: 0.0,
            max_avail: 0,
            max_delay: 0,
            min_avail: buffer_frames * 16,
            min_delay: buffer_frames * 16,
        }
    }
}

/// Watches device-reported buffer positions for out-of-envelope values.
///
/// The envelope is `coef × buffer_frames / 2`; any avail/delay value outside
/// it - or, for capture streams, avail exceeding delay - is "suspicious":
/// logged with a running counter, and the sane-window accumulator is reset.
/// In verbose mode, sane readings accumulate and a one-line summary is
/// emitted once per wall-clock second.
pub struct PositionMonitor {
    coef: i64,
    buffer_frames: i64,
    capture: bool,
    verbose: bool,

    counter: u64,
    bad_avail: i64,
    bad_delay: i64,
    window: Window,
    window_second: Option<u64>,
}

impl PositionMonitor {
    /// Creates a monitor for the given stream shape.
    ///
    /// `coef` is the out-of-range test coefficient (classic default 8,
    /// clamped to at least 1).
    pub fn new(coef: i64, buffer_frames: usize, direction: Direction, verbose: bool) -> Self {
        let buffer_frames = buffer_frames as i64;
        Self {
            coef: coef.max(1),
            buffer_frames,
            capture: direction == Direction::Capture,
            verbose,
            counter: 0,
            bad_avail: 0,
            bad_delay: 0,
            window: Window::cleared(buffer_frames),
            window_second: None,
        }
    }

    /// Running count of suspicious observations.
    pub fn suspicious_count(&self) -> u64 {
        self.counter
    }

    /// Polls the device counters once and classifies them.
    ///
    /// Returns the event to surface when the reading was suspicious. Query
    /// failures are ignored - the monitor must never interfere with the
    /// transfer.
    pub fn check<D: PcmDevice>(&mut self, device: &mut D) -> Option<StreamEvent> {
        let Ok((avail, delay)) = device.avail_delay() else {
            return None;
        };
        let Ok(status) = device.status() else {
            return None;
        };
        let (s_avail, s_delay) = (status.avail, status.delay);

        let envelope = self.coef * self.buffer_frames / 2;
        let out = |v: i64| v > envelope || v < -envelope;

        if out(avail) || out(delay) {
            return Some(self.flag("buffer position", avail, delay));
        }
        if out(s_avail) || out(s_delay) {
            return Some(self.flag("status buffer position", s_avail, s_delay));
        }
        if self.capture && avail > delay {
            return Some(self.flag("buffer position avail > delay", avail, delay));
        }
        if self.capture && s_avail > s_delay {
            return Some(self.flag("status buffer position avail > delay", s_avail, s_delay));
        }

        if self.verbose {
            self.accumulate(avail, delay, s_avail, s_delay);
        }
        None
    }

    fn flag(&mut self, what: &str, avail: i64, delay: i64) -> StreamEvent {
        self.counter += 1;
        self.bad_avail = avail;
        self.bad_delay = delay;
        self.window = Window::cleared(self.buffer_frames);
        self.window_second = None;
        tracing::warn!(
            total = self.counter,
            avail,
            delay,
            buffer = self.buffer_frames,
            "Suspicious {}", what
        );
        StreamEvent::SuspiciousPosition {
            total: self.counter,
            avail,
            delay,
        }
    }

    fn accumulate(&mut self, avail: i64, delay: i64, s_avail: i64, s_delay: i64) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let second = match self.window_second {
            Some(second) => second,
            None => {
                self.window = Window::cleared(self.buffer_frames);
                self.window_second = Some(now);
                now
            }
        };

        let w = &mut self.window;
        w.max_avail = w.max_avail.max(avail).max(s_avail);
        w.max_delay = w.max_delay.max(delay).max(s_delay);
        w.min_avail = w.min_avail.min(avail).min(s_avail);
        w.min_delay = w.min_delay.min(delay).min(s_delay);
        w.avail_sum += avail as f64;
        w.delay_sum += delay as f64;
        w.samples += 1.0;

        if (w.max_avail != 0 || w.max_delay != 0) && now != second {
            tracing::debug!(
                avg_avail = (w.avail_sum / w.samples) as i64,
                avg_delay = (w.delay_sum / w.samples) as i64,
                min_avail = w.min_avail,
                min_delay = w.min_delay,
                max_avail = w.max_avail,
                max_delay = w.max_delay,
                buffer = self.buffer_frames,
                suspicious = self.counter,
                bad_avail = self.bad_avail,
                bad_delay = self.bad_delay,
                "BUFPOS"
            );
            self.window_second = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::device::mock::MockDevice;

    fn monitor(direction: Direction) -> (PositionMonitor, MockDevice) {
        let config = StreamConfig::default(); // buffer 4096
        (
            PositionMonitor::new(8, config.buffer_frames, direction, false),
            MockDevice::new(&config),
        )
    }

    #[test]
    fn test_sane_position_not_flagged() {
        let (mut monitor, mut device) = monitor(Direction::Playback);
        // default mock answer: half the buffer for both counters
        assert!(monitor.check(&mut device).is_none());
        assert_eq!(monitor.suspicious_count(), 0);
    }

    #[test]
    fn test_out_of_envelope_flagged() {
        let (mut monitor, mut device) = monitor(Direction::Playback);
        // envelope = 8 * 4096 / 2 = 16384
        device.push_avail_delay(20_000, 100);
        assert!(monitor.check(&mut device).is_some());
        assert_eq!(monitor.suspicious_count(), 1);
    }

    #[test]
    fn test_negative_out_of_envelope_flagged() {
        let (mut monitor, mut device) = monitor(Direction::Playback);
        device.push_avail_delay(-20_000, 0);
        assert!(monitor.check(&mut device).is_some());
    }

    #[test]
    fn test_status_pair_also_checked() {
        let (mut monitor, mut device) = monitor(Direction::Playback);
        device.push_avail_delay(100, 100); // cheap query: sane
        device.push_avail_delay(99_999, 0); // status snapshot: bad
        let event = monitor.check(&mut device).unwrap();
        match event {
            StreamEvent::SuspiciousPosition { avail, .. } => assert_eq!(avail, 99_999),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_capture_avail_above_delay_is_suspicious() {
        let (mut monitor, mut device) = monitor(Direction::Capture);
        device.push_avail_delay(300, 200);
        assert!(monitor.check(&mut device).is_some());
        assert_eq!(monitor.suspicious_count(), 1);
    }

    #[test]
    fn test_playback_avail_above_delay_is_fine() {
        let (mut monitor, mut device) = monitor(Direction::Playback);
        device.push_avail_delay(300, 200);
        device.push_avail_delay(300, 200);
        assert!(monitor.check(&mut device).is_none());
    }

    #[test]
    fn test_counter_accumulates() {
        let (mut monitor, mut device) = monitor(Direction::Capture);
        // each check consumes two scripted pairs (query + status snapshot)
        for _ in 0..6 {
            device.push_avail_delay(300, 200);
        }
        monitor.check(&mut device);
        monitor.check(&mut device);
        monitor.check(&mut device);
        assert_eq!(monitor.suspicious_count(), 3);
    }
}
