//! Scriptable mock device for testing without hardware.
//!
//! `MockDevice` lets tests stage exact sequences of device behavior -
//! short transfers, would-block, underruns, suspends - and inspect what the
//! engine actually transferred. This keeps the whole engine testable in CI
//! environments with no sound hardware at all.

use std::collections::VecDeque;
use std::time::Duration;

use crate::config::StreamConfig;
use crate::device::{DeviceError, DeviceStatus, IoOutcome, PcmDevice, PcmState, ResumeOutcome};

/// One staged response for the next device I/O call.
#[derive(Debug, Clone, Copy)]
pub enum IoStep {
    /// Accept at most this many frames of the request.
    Accept(usize),
    /// Report a would-block condition.
    WouldBlock,
    /// Report an underrun/overrun and enter the xrun state.
    Xrun,
    /// Report a suspend and enter the suspended state.
    Suspended,
    /// Hard-fail the call (fatal from the engine's point of view).
    Fail(&'static str),
}

/// A mock PCM device driven by a script of [`IoStep`]s.
///
/// With an empty script every I/O call accepts the full request. Playback
/// bytes are captured for inspection; capture reads are filled with a
/// per-frame counter so tests can assert that no frame was lost or
/// duplicated across fault recovery.
///
/// # Example
///
/// ```
/// use pcm_stream::{MockDevice, StreamConfig};
/// use pcm_stream::device::mock::IoStep;
///
/// let config = StreamConfig::default();
/// let mut device = MockDevice::new(&config);
/// device.push_step(IoStep::Xrun);          // first call: underrun
/// device.push_step(IoStep::Accept(1024));  // retry succeeds
/// ```
pub struct MockDevice {
    channels: usize,
    bytes_per_sample: usize,
    bytes_per_frame: usize,
    buffer_frames: usize,

    script: VecDeque<IoStep>,
    avail_delay_script: VecDeque<(i64, i64)>,
    resume_script: VecDeque<ResumeOutcome>,

    state: PcmState,
    paused: bool,
    can_pause: bool,

    /// Interleaved bytes accepted by `writei`, in order.
    written: Vec<u8>,
    /// Per-channel bytes accepted by `writen`.
    written_planar: Vec<Vec<u8>>,
    /// Counter stamped into capture frames, one value per frame.
    fill_counter: u64,

    frames_accepted: u64,
    prepare_count: u32,
    wait_count: u64,
    drained: bool,
}

impl MockDevice {
    /// Creates a mock device matching the given configuration.
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            channels: config.channels,
            bytes_per_sample: config.format.bytes_per_sample(),
            bytes_per_frame: config.bytes_per_frame(),
            buffer_frames: config.buffer_frames,
            script: VecDeque::new(),
            avail_delay_script: VecDeque::new(),
            resume_script: VecDeque::new(),
            state: PcmState::Prepared,
            paused: false,
            can_pause: true,
            written: Vec::new(),
            written_planar: vec![Vec::new(); config.channels],
            fill_counter: 0,
            frames_accepted: 0,
            prepare_count: 0,
            wait_count: 0,
            drained: false,
        }
    }

    /// Stages the response for the next I/O call.
    pub fn push_step(&mut self, step: IoStep) {
        self.script.push_back(step);
    }

    /// Stages an `(avail, delay)` answer for the next counter query.
    ///
    /// Both the cheap query and the status snapshot consume from the same
    /// script; with the script empty, both report a half-full buffer.
    pub fn push_avail_delay(&mut self, avail: i64, delay: i64) {
        self.avail_delay_script.push_back((avail, delay));
    }

    /// Stages the outcome of the next resume attempt.
    pub fn push_resume(&mut self, outcome: ResumeOutcome) {
        self.resume_script.push_back(outcome);
    }

    /// Disables the hardware pause capability.
    pub fn without_pause_support(mut self) -> Self {
        self.can_pause = false;
        self
    }

    /// All interleaved bytes the device accepted, in order.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Bytes accepted per channel in planar mode.
    pub fn written_planar(&self) -> &[Vec<u8>] {
        &self.written_planar
    }

    /// Total frames accepted across all I/O calls.
    pub fn frames_accepted(&self) -> u64 {
        self.frames_accepted
    }

    /// Number of times the device was re-primed.
    pub fn prepare_count(&self) -> u32 {
        self.prepare_count
    }

    /// Number of readiness waits the engine issued.
    pub fn wait_count(&self) -> u64 {
        self.wait_count
    }

    /// Whether `drain` was called.
    pub fn drained(&self) -> bool {
        self.drained
    }

    /// Whether the device is currently paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn next_step(&mut self, frames: usize) -> Result<(IoOutcome, usize), DeviceError> {
        match self.script.pop_front() {
            None => Ok((IoOutcome::Transferred(frames), frames)),
            Some(IoStep::Accept(max)) => {
                let n = frames.min(max);
                Ok((IoOutcome::Transferred(n), n))
            }
            Some(IoStep::WouldBlock) => Ok((IoOutcome::WouldBlock, 0)),
            Some(IoStep::Xrun) => {
                self.state = PcmState::Xrun;
                Ok((IoOutcome::Xrun, 0))
            }
            Some(IoStep::Suspended) => {
                self.state = PcmState::Suspended;
                Ok((IoOutcome::Suspended, 0))
            }
            Some(IoStep::Fail(msg)) => Err(DeviceError::new("io", msg)),
        }
    }

    fn next_avail_delay(&mut self) -> (i64, i64) {
        self.avail_delay_script
            .pop_front()
            .unwrap_or((self.buffer_frames as i64 / 2, self.buffer_frames as i64 / 2))
    }
}

impl PcmDevice for MockDevice {
    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<IoOutcome, DeviceError> {
        let (outcome, accepted) = self.next_step(frames)?;
        if accepted > 0 {
            let bytes = accepted * self.bytes_per_frame;
            self.written.extend_from_slice(&buf[..bytes]);
            self.frames_accepted += accepted as u64;
            self.state = PcmState::Running;
        }
        Ok(outcome)
    }

    fn readi(&mut self, buf: &mut [u8], frames: usize) -> Result<IoOutcome, DeviceError> {
        let (outcome, accepted) = self.next_step(frames)?;
        if accepted > 0 {
            for frame in 0..accepted {
                let value = self.fill_counter as u8;
                self.fill_counter += 1;
                let start = frame * self.bytes_per_frame;
                buf[start..start + self.bytes_per_frame].fill(value);
            }
            self.frames_accepted += accepted as u64;
            self.state = PcmState::Running;
        }
        Ok(outcome)
    }

    fn writen(&mut self, bufs: &[&[u8]], frames: usize) -> Result<IoOutcome, DeviceError> {
        let (outcome, accepted) = self.next_step(frames)?;
        if accepted > 0 {
            let bytes = accepted * self.bytes_per_sample;
            for (channel, buf) in bufs.iter().enumerate() {
                self.written_planar[channel].extend_from_slice(&buf[..bytes]);
            }
            self.frames_accepted += accepted as u64;
            self.state = PcmState::Running;
        }
        Ok(outcome)
    }

    fn readn(&mut self, bufs: &mut [&mut [u8]], frames: usize) -> Result<IoOutcome, DeviceError> {
        let (outcome, accepted) = self.next_step(frames)?;
        if accepted > 0 {
            for frame in 0..accepted {
                let value = self.fill_counter as u8;
                self.fill_counter += 1;
                let start = frame * self.bytes_per_sample;
                for buf in bufs.iter_mut() {
                    buf[start..start + self.bytes_per_sample].fill(value);
                }
            }
            self.frames_accepted += accepted as u64;
            self.state = PcmState::Running;
        }
        Ok(outcome)
    }

    fn avail_delay(&mut self) -> Result<(i64, i64), DeviceError> {
        Ok(self.next_avail_delay())
    }

    fn status(&mut self) -> Result<DeviceStatus, DeviceError> {
        let (avail, delay) = self.next_avail_delay();
        let trigger_elapsed = match self.state {
            PcmState::Xrun | PcmState::Suspended => Some(Duration::from_millis(5)),
            _ => None,
        };
        Ok(DeviceStatus {
            state: self.state,
            avail,
            delay,
            trigger_elapsed,
        })
    }

    fn state(&mut self) -> PcmState {
        self.state
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.state = PcmState::Prepared;
        self.prepare_count += 1;
        Ok(())
    }

    fn resume(&mut self) -> ResumeOutcome {
        let outcome = self.resume_script.pop_front().unwrap_or(ResumeOutcome::Resumed);
        if outcome == ResumeOutcome::Resumed {
            self.state = PcmState::Prepared;
        }
        outcome
    }

    fn pause(&mut self, enable: bool) -> Result<(), DeviceError> {
        if !self.can_pause {
            return Err(DeviceError::new("pause", "not supported"));
        }
        self.paused = enable;
        self.state = if enable {
            PcmState::Paused
        } else {
            PcmState::Running
        };
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.drained = true;
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn wait(&mut self, _timeout_ms: i32) -> Result<bool, DeviceError> {
        self.wait_count += 1;
        Ok(true)
    }

    fn can_pause(&self) -> bool {
        self.can_pause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StreamConfig {
        StreamConfig::default()
    }

    #[test]
    fn test_mock_accepts_all_by_default() {
        let mut device = MockDevice::new(&config());
        let buf = vec![0x80u8; 1024];
        let outcome = device.writei(&buf, 1024).unwrap();
        assert_eq!(outcome, IoOutcome::Transferred(1024));
        assert_eq!(device.written().len(), 1024);
    }

    #[test]
    fn test_mock_scripted_short_transfer() {
        let mut device = MockDevice::new(&config());
        device.push_step(IoStep::Accept(100));
        let buf = vec![0u8; 1024];
        assert_eq!(
            device.writei(&buf, 1024).unwrap(),
            IoOutcome::Transferred(100)
        );
        assert_eq!(device.written().len(), 100);
    }

    #[test]
    fn test_mock_xrun_sets_state() {
        let mut device = MockDevice::new(&config());
        device.push_step(IoStep::Xrun);
        let buf = vec![0u8; 8];
        assert_eq!(device.writei(&buf, 8).unwrap(), IoOutcome::Xrun);
        assert_eq!(device.state(), PcmState::Xrun);
        device.prepare().unwrap();
        assert_eq!(device.state(), PcmState::Prepared);
        assert_eq!(device.prepare_count(), 1);
    }

    #[test]
    fn test_mock_read_stamps_frame_counter() {
        let mut device = MockDevice::new(&config());
        let mut buf = vec![0u8; 4];
        device.readi(&mut buf, 4).unwrap();
        assert_eq!(buf, vec![0, 1, 2, 3]);
        device.readi(&mut buf, 4).unwrap();
        assert_eq!(buf, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_mock_planar_write_splits_channels() {
        let cfg = StreamConfig {
            channels: 2,
            ..config()
        };
        let mut device = MockDevice::new(&cfg);
        let left = vec![1u8; 8];
        let right = vec![2u8; 8];
        device.writen(&[&left, &right], 8).unwrap();
        assert_eq!(device.written_planar()[0], vec![1u8; 8]);
        assert_eq!(device.written_planar()[1], vec![2u8; 8]);
    }

    #[test]
    fn test_mock_resume_script() {
        let mut device = MockDevice::new(&config());
        device.push_resume(ResumeOutcome::Retry);
        device.push_resume(ResumeOutcome::Resumed);
        assert_eq!(device.resume(), ResumeOutcome::Retry);
        assert_eq!(device.resume(), ResumeOutcome::Resumed);
        assert_eq!(device.state(), PcmState::Prepared);
    }
}
