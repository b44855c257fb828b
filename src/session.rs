//! Stream session: the one explicit context object.
//!
//! All mutable per-stream state - the device handle, the reusable transfer
//! buffer, the cooperative trigger flags, the optional meter/monitor/control
//! attachments and the running statistics - lives here and is passed by
//! reference into every component. There are no ambient globals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::TransferBuffer;
use crate::config::StreamConfig;
use crate::control::InteractiveControl;
use crate::device::PcmDevice;
use crate::error::StreamError;
use crate::event::{EventCallback, StreamEvent};
use crate::meter::PeakMeter;
use crate::monitor::PositionMonitor;

/// Cooperative out-of-band triggers.
///
/// Both flags are single-writer/single-reader: an external delivery layer
/// (typically a signal handler) stores, the main loop polls at defined
/// checkpoints. Nothing is ever acted on from inside a handler.
#[derive(Clone)]
pub struct SessionFlags {
    abort: Arc<AtomicBool>,
    rotate: Arc<AtomicBool>,
}

impl SessionFlags {
    /// Creates a fresh pair of cleared flags.
    pub fn new() -> Self {
        Self {
            abort: Arc::new(AtomicBool::new(false)),
            rotate: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Requests termination as soon as possible (finishing at most the
    /// in-flight chunk).
    pub fn abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// Whether an abort was requested.
    pub fn is_aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Requests capture-file rotation at the next chunk boundary.
    pub fn request_rotate(&self) {
        self.rotate.store(true, Ordering::SeqCst);
    }

    /// Consumes a pending rotation request, if any.
    pub fn take_rotate(&self) -> bool {
        self.rotate.swap(false, Ordering::SeqCst)
    }

    /// Whether a rotation request is pending (without consuming it).
    pub fn rotate_pending(&self) -> bool {
        self.rotate.load(Ordering::SeqCst)
    }

    /// The raw abort flag, for registration with a signal delivery layer.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// The raw rotation flag, for registration with a signal delivery layer.
    pub fn rotate_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.rotate)
    }
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Knobs that tune engine behavior without being part of the negotiated
/// stream configuration.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Verbosity level (repeatable `-v` at the CLI surface).
    pub verbose: u8,
    /// Suppress non-essential stderr output.
    pub quiet: bool,
    /// Escalate recoverable device faults to fatal errors.
    pub fatal_errors: bool,
    /// Skip the bounded readiness wait and busy-poll the device instead.
    pub busy_poll: bool,
}

/// Statistics about a stream session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStats {
    /// Frames accepted by (playback) or taken from (capture) the device.
    pub frames_transferred: u64,
    /// Underruns/overruns recovered in place.
    pub xruns_recovered: u64,
    /// Suspend cycles survived.
    pub suspends_recovered: u64,
    /// Draining-state capture recoveries (stream format changes).
    pub capture_rebounds: u64,
    /// Capture files opened so far.
    pub files_written: u32,
}

/// An active stream session over one device handle.
pub struct StreamSession<D: PcmDevice> {
    pub(crate) device: D,
    pub(crate) config: StreamConfig,
    pub(crate) buffer: TransferBuffer,
    pub(crate) flags: SessionFlags,
    pub(crate) opts: SessionOptions,
    pub(crate) meter: Option<PeakMeter>,
    pub(crate) monitor: Option<PositionMonitor>,
    pub(crate) control: Option<InteractiveControl>,
    pub(crate) events: Option<EventCallback>,
    pub(crate) stats: SessionStats,
}

impl<D: PcmDevice> StreamSession<D> {
    /// Creates a session over a device opened with the given negotiated
    /// configuration.
    pub fn new(
        device: D,
        config: StreamConfig,
        opts: SessionOptions,
    ) -> Result<Self, StreamError> {
        config.validate()?;
        let buffer = TransferBuffer::new(&config);
        Ok(Self {
            device,
            config,
            buffer,
            flags: SessionFlags::new(),
            opts,
            meter: None,
            monitor: None,
            control: None,
            events: None,
            stats: SessionStats::default(),
        })
    }

    /// Attaches a VU meter.
    #[must_use]
    pub fn with_meter(mut self, meter: PeakMeter) -> Self {
        self.meter = Some(meter);
        self
    }

    /// Attaches a buffer-position monitor.
    #[must_use]
    pub fn with_monitor(mut self, monitor: PositionMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Attaches interactive pause/resume control.
    #[must_use]
    pub fn with_control(mut self, control: InteractiveControl) -> Self {
        self.control = Some(control);
        self
    }

    /// Registers a runtime event callback.
    #[must_use]
    pub fn with_events(mut self, events: EventCallback) -> Self {
        self.events = Some(events);
        self
    }

    /// The session's cooperative trigger flags (cheap clone).
    pub fn flags(&self) -> SessionFlags {
        self.flags.clone()
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// The negotiated stream configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Borrows the device collaborator.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Mutably borrows the device collaborator.
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Tears the session down, handing the device back.
    pub fn into_device(self) -> D {
        self.device
    }

    /// Plays out queued frames at the end of a playback stream.
    pub fn drain(&mut self) -> Result<(), StreamError> {
        self.device.drain().map_err(StreamError::from)
    }

    pub(crate) fn emit(&self, event: StreamEvent) {
        if let Some(ref callback) = self.events {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;

    #[test]
    fn test_flags_start_cleared() {
        let flags = SessionFlags::new();
        assert!(!flags.is_aborted());
        assert!(!flags.rotate_pending());
    }

    #[test]
    fn test_abort_is_sticky() {
        let flags = SessionFlags::new();
        flags.abort();
        assert!(flags.is_aborted());
        assert!(flags.is_aborted());
    }

    #[test]
    fn test_rotate_is_consumed() {
        let flags = SessionFlags::new();
        flags.request_rotate();
        assert!(flags.take_rotate());
        assert!(!flags.take_rotate());
    }

    #[test]
    fn test_flag_handles_share_state() {
        let flags = SessionFlags::new();
        let handle = flags.abort_handle();
        handle.store(true, Ordering::SeqCst);
        assert!(flags.is_aborted());
    }

    #[test]
    fn test_session_validates_config() {
        let mut config = StreamConfig::default();
        config.chunk_frames = config.buffer_frames;
        let device = MockDevice::new(&config);
        assert!(StreamSession::new(device, config, SessionOptions::default()).is_err());
    }

    #[test]
    fn test_session_stats_start_zero() {
        let config = StreamConfig::default();
        let device = MockDevice::new(&config);
        let session = StreamSession::new(device, config, SessionOptions::default()).unwrap();
        assert_eq!(session.stats().frames_transferred, 0);
        assert_eq!(session.stats().xruns_recovered, 0);
    }
}
