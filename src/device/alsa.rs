//! ALSA-backed PCM device (feature `alsa-backend`).
//!
//! Thin adapter between the [`PcmDevice`] trait and libasound: opens a PCM
//! by name, runs a compact hardware/software parameter negotiation, and
//! maps the classic fault errnos onto [`IoOutcome`] values. The engine
//! consumes only the negotiated result handed back as a
//! [`StreamConfig`].
//!
//! This backend drives interleaved buffered transfers; the noninterleaved
//! and memory-mapped primitive families are not exposed by the safe ALSA
//! bindings and are declined at open time.

use alsa::pcm::{Access, Format, Frames, HwParams, State, PCM};
use alsa::{Direction as AlsaDirection, ValueOr};
use std::time::Duration;

use crate::config::{AccessMode, Direction, StreamConfig, TransferMethod};
use crate::device::{DeviceError, DeviceStatus, IoOutcome, PcmDevice, PcmState, ResumeOutcome};
use crate::error::StreamError;
use crate::format::SampleFormat;

/// Requested device parameters, before negotiation.
///
/// Everything here is a wish; the effective values come back in the
/// [`StreamConfig`] returned by [`AlsaDevice::open`].
#[derive(Debug, Clone)]
pub struct DeviceRequest {
    /// Desired sample format.
    pub format: SampleFormat,
    /// Desired channel count.
    pub channels: usize,
    /// Desired frame rate in Hz.
    pub rate: u32,
    /// Period (chunk) length in microseconds.
    pub period_time_us: Option<u32>,
    /// Period (chunk) length in frames; overridden by `period_time_us`.
    pub period_frames: Option<usize>,
    /// Buffer length in microseconds.
    pub buffer_time_us: Option<u32>,
    /// Buffer length in frames; overridden by `buffer_time_us`.
    pub buffer_frames: Option<usize>,
    /// Minimum available frames for wakeup, in microseconds of audio.
    pub avail_min_us: Option<u32>,
    /// Automatic-start delay in microseconds; values ≤ 0 are relative to
    /// the buffer size.
    pub start_delay_us: i64,
    /// Automatic-stop delay in microseconds from the fault.
    pub stop_delay_us: i64,
    /// Requested channel layout.
    pub access: AccessMode,
    /// Requested transfer primitive family.
    pub method: TransferMethod,
    /// Open the device in nonblocking mode.
    pub nonblock: bool,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            format: SampleFormat::U8,
            channels: 1,
            rate: 8000,
            period_time_us: None,
            period_frames: None,
            buffer_time_us: None,
            buffer_frames: None,
            avail_min_us: None,
            start_delay_us: 0,
            stop_delay_us: 0,
            access: AccessMode::Interleaved,
            method: TransferMethod::Buffered,
            nonblock: false,
        }
    }
}

/// A PCM device handle backed by libasound.
pub struct AlsaDevice {
    pcm: PCM,
    can_pause: bool,
    bytes_per_frame: usize,
}

impl AlsaDevice {
    /// Opens `name` and negotiates parameters.
    ///
    /// Returns the device together with the effective configuration the
    /// engine will run with. Negotiation failures are configuration
    /// errors - the device cannot satisfy the request.
    pub fn open(
        name: &str,
        direction: Direction,
        req: &DeviceRequest,
    ) -> Result<(Self, StreamConfig), StreamError> {
        if req.access == AccessMode::Planar {
            return Err(StreamError::config(
                "noninterleaved access is not supported by the ALSA backend",
            ));
        }
        if req.method == TransferMethod::MemoryMapped {
            return Err(StreamError::config(
                "mmap transfer is not supported by the ALSA backend",
            ));
        }

        let alsa_dir = match direction {
            Direction::Playback => AlsaDirection::Playback,
            Direction::Capture => AlsaDirection::Capture,
        };
        let pcm = PCM::new(name, alsa_dir, req.nonblock)
            .map_err(|e| StreamError::config(format!("audio open error: {e}")))?;

        let (chunk_frames, buffer_frames, rate, channels, can_pause) =
            negotiate_hw(&pcm, req)?;
        if chunk_frames == buffer_frames {
            return Err(StreamError::config(format!(
                "cannot use period equal to buffer size ({} == {})",
                chunk_frames, buffer_frames
            )));
        }

        let (start_threshold, stop_threshold) =
            negotiate_sw(&pcm, req, rate, chunk_frames, buffer_frames)?;

        let config = StreamConfig {
            direction,
            format: req.format,
            channels,
            rate,
            chunk_frames,
            buffer_frames,
            access: AccessMode::Interleaved,
            method: TransferMethod::Buffered,
            start_threshold,
            stop_threshold,
        };
        tracing::info!(
            device = name,
            format = %config.format,
            rate = config.rate,
            channels = config.channels,
            chunk = config.chunk_frames,
            buffer = config.buffer_frames,
            "negotiated PCM parameters"
        );

        let bytes_per_frame = config.bytes_per_frame();
        Ok((
            Self {
                pcm,
                can_pause,
                bytes_per_frame,
            },
            config,
        ))
    }

    fn classify(&self, op: &'static str, err: alsa::Error) -> Result<IoOutcome, DeviceError> {
        match err.errno() {
            libc::EAGAIN => Ok(IoOutcome::WouldBlock),
            libc::EPIPE => Ok(IoOutcome::Xrun),
            libc::ESTRPIPE => Ok(IoOutcome::Suspended),
            _ => Err(DeviceError::new(op, err.to_string())),
        }
    }
}

fn negotiate_hw(
    pcm: &PCM,
    req: &DeviceRequest,
) -> Result<(usize, usize, u32, usize, bool), StreamError> {
    let cfg = |e: alsa::Error| StreamError::config(e.to_string());

    let hwp = HwParams::any(pcm).map_err(|_| {
        StreamError::config("broken configuration for this PCM: no configurations available")
    })?;
    hwp.set_access(Access::RWInterleaved)
        .map_err(|_| StreamError::config("access type not available"))?;
    hwp.set_format(map_format(req.format)?)
        .map_err(|_| StreamError::config(format!("sample format {} not available", req.format)))?;
    hwp.set_channels(req.channels as u32)
        .map_err(|_| StreamError::config("channels count not available"))?;
    let rate = {
        hwp.set_rate_near(req.rate, ValueOr::Nearest).map_err(cfg)?;
        hwp.get_rate().map_err(cfg)?
    };
    if (f64::from(rate) - f64::from(req.rate)).abs() > f64::from(req.rate) * 0.05 {
        tracing::warn!(requested = req.rate, got = rate, "rate is not accurate");
    }

    // buffer first: cap an unconstrained buffer at half a second, then
    // derive the period as a quarter of it
    let mut buffer_time = req.buffer_time_us;
    if buffer_time.is_none() && req.buffer_frames.is_none() {
        let max = hwp.get_buffer_time_max().map_err(cfg)?;
        buffer_time = Some(max.min(500_000));
    }
    let period_given = req.period_time_us.is_some() || req.period_frames.is_some();
    match (req.period_time_us, req.period_frames) {
        (Some(us), _) => {
            hwp.set_period_time_near(us, ValueOr::Nearest).map_err(cfg)?;
        }
        (None, Some(frames)) => {
            hwp.set_period_size_near(frames as Frames, ValueOr::Nearest)
                .map_err(cfg)?;
        }
        (None, None) => {}
    }
    match (buffer_time, req.buffer_frames) {
        (Some(us), _) => {
            if !period_given {
                hwp.set_period_time_near(us / 4, ValueOr::Nearest).map_err(cfg)?;
            }
            hwp.set_buffer_time_near(us, ValueOr::Nearest).map_err(cfg)?;
        }
        (None, Some(frames)) => {
            if !period_given {
                hwp.set_period_size_near((frames / 4) as Frames, ValueOr::Nearest)
                    .map_err(cfg)?;
            }
            hwp.set_buffer_size_near(frames as Frames).map_err(cfg)?;
        }
        (None, None) => {}
    }

    let can_pause = hwp.can_pause();
    pcm.hw_params(&hwp)
        .map_err(|e| StreamError::config(format!("unable to install hw params: {e}")))?;

    let current = pcm.hw_params_current().map_err(cfg)?;
    Ok((
        current.get_period_size().map_err(cfg)? as usize,
        current.get_buffer_size().map_err(cfg)? as usize,
        current.get_rate().map_err(cfg)?,
        current.get_channels().map_err(cfg)? as usize,
        can_pause,
    ))
}

fn negotiate_sw(
    pcm: &PCM,
    req: &DeviceRequest,
    rate: u32,
    chunk_frames: usize,
    buffer_frames: usize,
) -> Result<(u64, u64), StreamError> {
    let cfg = |e: alsa::Error| StreamError::config(format!("unable to install sw params: {e}"));

    let swp = pcm.sw_params_current().map_err(cfg)?;
    let avail_min = match req.avail_min_us {
        Some(us) => (f64::from(rate) * f64::from(us) / 1_000_000.0) as Frames,
        None => chunk_frames as Frames,
    };
    swp.set_avail_min(avail_min).map_err(cfg)?;

    let frames_for = |us: i64| (f64::from(rate) * us as f64 / 1_000_000.0) as i64;
    let mut start_threshold = if req.start_delay_us <= 0 {
        buffer_frames as i64 + frames_for(req.start_delay_us)
    } else {
        frames_for(req.start_delay_us)
    };
    start_threshold = start_threshold.clamp(1, buffer_frames as i64);
    swp.set_start_threshold(start_threshold as Frames).map_err(cfg)?;

    let stop_threshold = if req.stop_delay_us <= 0 {
        buffer_frames as i64 + frames_for(req.stop_delay_us)
    } else {
        frames_for(req.stop_delay_us)
    };
    swp.set_stop_threshold(stop_threshold as Frames).map_err(cfg)?;

    pcm.sw_params(&swp).map_err(cfg)?;
    Ok((start_threshold as u64, stop_threshold.max(0) as u64))
}

fn map_format(format: SampleFormat) -> Result<Format, StreamError> {
    let mapped = match format {
        SampleFormat::U8 => Format::U8,
        SampleFormat::S8 => Format::S8,
        SampleFormat::S16_LE => Format::S16LE,
        SampleFormat::S16_BE => Format::S16BE,
        SampleFormat::U16_LE => Format::U16LE,
        SampleFormat::U16_BE => Format::U16BE,
        SampleFormat::S24_3LE => Format::S243LE,
        SampleFormat::S24_3BE => Format::S243BE,
        SampleFormat::S32_LE => Format::S32LE,
        SampleFormat::S32_BE => Format::S32BE,
        SampleFormat::U32_LE => Format::U32LE,
        other => {
            return Err(StreamError::config(format!(
                "sample format {} has no ALSA mapping",
                other
            )))
        }
    };
    Ok(mapped)
}

fn map_state(state: State) -> PcmState {
    match state {
        State::Running => PcmState::Running,
        State::XRun => PcmState::Xrun,
        State::Draining => PcmState::Draining,
        State::Paused => PcmState::Paused,
        State::Suspended => PcmState::Suspended,
        State::Disconnected => PcmState::Disconnected,
        State::Open | State::Setup | State::Prepared => PcmState::Prepared,
    }
}

fn timespec_elapsed(now: libc::timespec, earlier: libc::timespec) -> Option<Duration> {
    let secs = now.tv_sec as i64 - earlier.tv_sec as i64;
    let nanos = now.tv_nsec as i64 - earlier.tv_nsec as i64;
    let total = secs * 1_000_000_000 + nanos;
    (total > 0).then(|| Duration::from_nanos(total as u64))
}

impl PcmDevice for AlsaDevice {
    fn writei(&mut self, buf: &[u8], frames: usize) -> Result<IoOutcome, DeviceError> {
        let io = self
            .pcm
            .io_bytes();
        match io.writei(&buf[..frames * self.bytes_per_frame]) {
            Ok(written) => Ok(IoOutcome::Transferred(written)),
            Err(err) => self.classify("write", err),
        }
    }

    fn readi(&mut self, buf: &mut [u8], frames: usize) -> Result<IoOutcome, DeviceError> {
        let io = self
            .pcm
            .io_bytes();
        match io.readi(&mut buf[..frames * self.bytes_per_frame]) {
            Ok(read) => Ok(IoOutcome::Transferred(read)),
            Err(err) => self.classify("read", err),
        }
    }

    fn writen(&mut self, _bufs: &[&[u8]], _frames: usize) -> Result<IoOutcome, DeviceError> {
        Err(DeviceError::new(
            "writev",
            "noninterleaved access is not supported by the ALSA backend",
        ))
    }

    fn readn(&mut self, _bufs: &mut [&mut [u8]], _frames: usize) -> Result<IoOutcome, DeviceError> {
        Err(DeviceError::new(
            "readv",
            "noninterleaved access is not supported by the ALSA backend",
        ))
    }

    fn avail_delay(&mut self) -> Result<(i64, i64), DeviceError> {
        let avail = self
            .pcm
            .avail()
            .map_err(|e| DeviceError::new("avail", e.to_string()))?;
        let delay = self
            .pcm
            .delay()
            .map_err(|e| DeviceError::new("delay", e.to_string()))?;
        Ok((avail as i64, delay as i64))
    }

    fn status(&mut self) -> Result<DeviceStatus, DeviceError> {
        let status = self
            .pcm
            .status()
            .map_err(|e| DeviceError::new("status", e.to_string()))?;
        let state = map_state(status.get_state());
        let trigger_elapsed = match state {
            PcmState::Xrun | PcmState::Suspended => {
                timespec_elapsed(status.get_htstamp(), status.get_trigger_htstamp())
            }
            _ => None,
        };
        Ok(DeviceStatus {
            state,
            avail: status.get_avail() as i64,
            delay: status.get_delay() as i64,
            trigger_elapsed,
        })
    }

    fn state(&mut self) -> PcmState {
        map_state(self.pcm.state())
    }

    fn prepare(&mut self) -> Result<(), DeviceError> {
        self.pcm
            .prepare()
            .map_err(|e| DeviceError::new("prepare", e.to_string()))
    }

    fn resume(&mut self) -> ResumeOutcome {
        match self.pcm.resume() {
            Ok(()) => ResumeOutcome::Resumed,
            Err(err) if err.errno() == libc::EAGAIN => ResumeOutcome::Retry,
            Err(_) => ResumeOutcome::Failed,
        }
    }

    fn pause(&mut self, enable: bool) -> Result<(), DeviceError> {
        self.pcm
            .pause(enable)
            .map_err(|e| DeviceError::new("pause", e.to_string()))
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.pcm
            .drain()
            .map_err(|e| DeviceError::new("drain", e.to_string()))
    }

    fn wait(&mut self, timeout_ms: i32) -> Result<bool, DeviceError> {
        self.pcm
            .wait(Some(timeout_ms.max(0) as u32))
            .map_err(|e| DeviceError::new("wait", e.to_string()))
    }

    fn can_pause(&self) -> bool {
        self.can_pause
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mapping() {
        assert_eq!(map_format(SampleFormat::S16_LE).unwrap(), Format::S16LE);
        assert_eq!(map_format(SampleFormat::U8).unwrap(), Format::U8);
        assert!(map_format(SampleFormat::custom(20, true, false)).is_err());
    }

    #[test]
    fn test_timespec_elapsed() {
        let earlier = libc::timespec {
            tv_sec: 10,
            tv_nsec: 500_000_000,
        };
        let now = libc::timespec {
            tv_sec: 11,
            tv_nsec: 250_000_000,
        };
        let elapsed = timespec_elapsed(now, earlier).unwrap();
        assert_eq!(elapsed, Duration::from_millis(750));
        assert!(timespec_elapsed(earlier, now).is_none());
    }
}
