//! The chunked transfer loop.
//!
//! Converts one abstract transfer request ("move N frames between the
//! session buffer and the device") into repeated device I/O calls,
//! absorbing short transfers and would-block conditions, dispatching fault
//! codes to recovery, and feeding every accepted span to the meter and the
//! position monitor. The abort flag is honored at loop-iteration
//! granularity: an in-flight device call always completes.

use crate::device::{IoOutcome, PcmDevice};
use crate::error::StreamError;
use crate::event::StreamEvent;
use crate::recovery::{self, XrunRecovery};
use crate::session::StreamSession;

/// Bounded readiness wait between retries, in milliseconds.
const READY_WAIT_MS: i32 = 100;

impl<D: PcmDevice> StreamSession<D> {
    /// Writes `frames` interleaved frames from the session buffer to the
    /// device.
    ///
    /// A request shorter than the chunk size (the last partial chunk of a
    /// stream) is padded to a whole chunk with the format's silence pattern
    /// before writing. Returns the total frames accepted by the device,
    /// including padding; callers detect early termination by comparing
    /// against the request.
    pub fn write_frames(&mut self, frames: usize) -> Result<usize, StreamError> {
        let chunk = self.config.chunk_frames;
        let bpf = self.config.bytes_per_frame();
        let mut count = frames.min(chunk);
        if count < chunk {
            let pad = count * bpf..chunk * bpf;
            self.config
                .format
                .fill_silence(&mut self.buffer.interleaved_mut()[pad]);
            count = chunk;
        }

        let mut result = 0usize;
        while count > 0 && !self.flags.is_aborted() {
            self.position_check();
            self.control_check()?;
            let offset = result * bpf;
            let outcome = {
                let buf = self.buffer.interleaved();
                self.device.writei(&buf[offset..offset + count * bpf], count)?
            };
            self.position_check();
            match outcome {
                IoOutcome::Transferred(n) => {
                    if n < count {
                        self.ready_wait();
                    }
                    if n > 0 {
                        self.meter_interleaved(offset, n);
                        result += n;
                        count -= n;
                    }
                }
                IoOutcome::WouldBlock => self.ready_wait(),
                IoOutcome::Xrun => self.handle_xrun()?,
                IoOutcome::Suspended => self.handle_suspend()?,
            }
        }
        self.stats.frames_transferred += result as u64;
        Ok(result)
    }

    /// Reads `frames` interleaved frames from the device into the session
    /// buffer.
    ///
    /// Capture never pads: a request shorter than the chunk size (the tail
    /// of a limited or size-capped capture) reads exactly that many frames.
    /// An abort stops the loop between device calls and returns the frames
    /// actually read so far; callers detect it by comparing against the
    /// request.
    pub fn read_frames(&mut self, frames: usize) -> Result<usize, StreamError> {
        let chunk = self.config.chunk_frames;
        let bpf = self.config.bytes_per_frame();
        let mut count = frames.min(chunk);
        let mut result = 0usize;
        while count > 0 {
            if self.flags.is_aborted() {
                break;
            }
            self.position_check();
            self.control_check()?;
            let offset = result * bpf;
            let outcome = {
                let buf = self.buffer.interleaved_mut();
                self.device.readi(&mut buf[offset..offset + count * bpf], count)?
            };
            self.position_check();
            match outcome {
                IoOutcome::Transferred(n) => {
                    if n < count {
                        self.ready_wait();
                    }
                    if n > 0 {
                        self.meter_interleaved(offset, n);
                        result += n;
                        count -= n;
                    }
                }
                IoOutcome::WouldBlock => self.ready_wait(),
                IoOutcome::Xrun => self.handle_xrun()?,
                IoOutcome::Suspended => self.handle_suspend()?,
            }
        }
        debug_assert!(result <= frames);
        self.stats.frames_transferred += result as u64;
        Ok(result)
    }

    /// Planar variant of [`write_frames`](Self::write_frames), one buffer
    /// per channel.
    pub fn write_frames_planar(&mut self, frames: usize) -> Result<usize, StreamError> {
        let chunk = self.config.chunk_frames;
        let bps = self.config.format.bytes_per_sample();
        let mut count = frames.min(chunk);
        if count < chunk {
            for buf in self.buffer.planar_mut() {
                self.config
                    .format
                    .fill_silence(&mut buf[count * bps..chunk * bps]);
            }
            count = chunk;
        }

        let mut result = 0usize;
        while count > 0 && !self.flags.is_aborted() {
            self.position_check();
            self.control_check()?;
            let offset = result * bps;
            let outcome = {
                let bufs: Vec<&[u8]> = self
                    .buffer
                    .planar()
                    .iter()
                    .map(|b| &b[offset..])
                    .collect();
                self.device.writen(&bufs, count)?
            };
            self.position_check();
            match outcome {
                IoOutcome::Transferred(n) => {
                    if n < count {
                        self.ready_wait();
                    }
                    if n > 0 {
                        self.meter_planar(offset, n);
                        result += n;
                        count -= n;
                    }
                }
                IoOutcome::WouldBlock => self.ready_wait(),
                IoOutcome::Xrun => self.handle_xrun()?,
                IoOutcome::Suspended => self.handle_suspend()?,
            }
        }
        self.stats.frames_transferred += result as u64;
        Ok(result)
    }

    /// Planar variant of [`read_frames`](Self::read_frames).
    pub fn read_frames_planar(&mut self, frames: usize) -> Result<usize, StreamError> {
        let chunk = self.config.chunk_frames;
        let bps = self.config.format.bytes_per_sample();
        let mut count = frames.min(chunk);
        let mut result = 0usize;
        while count > 0 {
            if self.flags.is_aborted() {
                break;
            }
            self.position_check();
            self.control_check()?;
            let offset = result * bps;
            let outcome = {
                let mut bufs: Vec<&mut [u8]> = self
                    .buffer
                    .planar_mut()
                    .iter_mut()
                    .map(|b| &mut b[offset..])
                    .collect();
                self.device.readn(&mut bufs, count)?
            };
            self.position_check();
            match outcome {
                IoOutcome::Transferred(n) => {
                    if n < count {
                        self.ready_wait();
                    }
                    if n > 0 {
                        self.meter_planar(offset, n);
                        result += n;
                        count -= n;
                    }
                }
                IoOutcome::WouldBlock => self.ready_wait(),
                IoOutcome::Xrun => self.handle_xrun()?,
                IoOutcome::Suspended => self.handle_suspend()?,
            }
        }
        debug_assert!(result <= frames);
        self.stats.frames_transferred += result as u64;
        Ok(result)
    }

    /// Waits briefly for device readiness, unless busy-poll mode is set.
    fn ready_wait(&mut self) {
        if !self.opts.busy_poll {
            let _ = self.device.wait(READY_WAIT_MS);
        }
    }

    fn meter_interleaved(&mut self, offset: usize, frames: usize) {
        if let Some(meter) = self.meter.as_mut() {
            let bpf = self.config.bytes_per_frame();
            let buf = self.buffer.interleaved();
            meter.update(&buf[offset..offset + frames * bpf]);
        }
    }

    fn meter_planar(&mut self, offset: usize, frames: usize) {
        if let Some(meter) = self.meter.as_mut() {
            let bps = self.config.format.bytes_per_sample();
            for buf in self.buffer.planar() {
                meter.update(&buf[offset..offset + frames * bps]);
            }
        }
    }

    fn position_check(&mut self) {
        if let Some(monitor) = self.monitor.as_mut() {
            if let Some(event) = monitor.check(&mut self.device) {
                if let Some(callback) = self.events.as_ref() {
                    callback(event);
                }
            }
        }
    }

    fn control_check(&mut self) -> Result<(), StreamError> {
        if let Some(control) = self.control.as_mut() {
            control.check(&mut self.device, self.opts.quiet, self.events.as_ref())?;
        }
        Ok(())
    }

    fn handle_xrun(&mut self) -> Result<(), StreamError> {
        match recovery::recover_xrun(&mut self.device, self.config.direction, &self.opts)? {
            XrunRecovery::Xrun { elapsed } => {
                self.stats.xruns_recovered += 1;
                self.emit(StreamEvent::XrunRecovered {
                    elapsed,
                    fault: recovery::fault_name(self.config.direction),
                });
            }
            XrunRecovery::CaptureRebound => {
                self.stats.capture_rebounds += 1;
                self.emit(StreamEvent::CaptureRebound);
            }
        }
        Ok(())
    }

    fn handle_suspend(&mut self) -> Result<(), StreamError> {
        let reprimed = recovery::recover_suspend(&mut self.device, self.opts.quiet)?;
        self.stats.suspends_recovered += 1;
        self.emit(StreamEvent::SuspendRecovered { reprimed });
        Ok(())
    }
}
