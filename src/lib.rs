//! # pcm-stream
//!
//! Streaming transfer engine for headerless raw PCM audio.
//!
//! `pcm-stream` moves audio between byte streams (files, pipes) and a
//! hardware-like PCM device in both directions: playback (process → device)
//! and capture (device → process). The engine is built around a chunked,
//! single-threaded transfer loop that survives the faults real devices
//! produce at runtime: buffer underrun/overrun, device suspend, partial
//! transfers and would-block conditions.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use pcm_stream::{MockDevice, SessionOptions, StreamConfig, StreamSession, TransferLimit};
//!
//! let config = StreamConfig::default();
//! let device = MockDevice::new(&config);
//! let mut session = StreamSession::new(device, config, SessionOptions::default())?;
//!
//! let mut input = std::fs::File::open("tone.raw")?;
//! let written = pcm_stream::pipeline::playback(
//!     &mut session,
//!     &mut input,
//!     "tone.raw",
//!     TransferLimit::Unlimited,
//! )?;
//! ```
//!
//! ## Architecture
//!
//! The device itself is an external collaborator behind the [`PcmDevice`]
//! trait; the engine only consumes the negotiated result of parameter setup
//! (chunk size, buffer size, thresholds, access mode). Everything the engine
//! owns - the reusable transfer buffer, the abort/rotation flags, the VU
//! meter, the position monitor - lives in one explicit [`StreamSession`]
//! object threaded through the components. Concurrency is cooperative:
//! asynchronous triggers (abort, capture-file rotation) are atomic flags set
//! by an external delivery layer and polled at loop checkpoints, never acted
//! on asynchronously.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample widths
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod buffer;
mod config;
mod control;
pub mod device;
mod error;
mod event;
mod format;
mod meter;
mod monitor;
pub mod pipeline;
mod recovery;
mod rotate;
mod session;
mod transfer;

pub use buffer::TransferBuffer;
pub use config::{
    AccessMode, Direction, FormatPreset, StreamConfig, TransferLimit, TransferMethod,
};
pub use control::{InteractiveControl, KeySource, ScriptedKeys};
pub use device::{DeviceError, DeviceStatus, IoOutcome, PcmDevice, PcmState, ResumeOutcome};
pub use device::mock::MockDevice;
pub use error::StreamError;
pub use event::{event_callback, EventCallback, StreamEvent};
pub use format::SampleFormat;
pub use meter::{MeterMode, MeterStyle, PeakMeter};
pub use monitor::PositionMonitor;
pub use rotate::{CaptureFileSeries, NamePolicy};
pub use session::{SessionFlags, SessionOptions, SessionStats, StreamSession};

#[cfg(feature = "alsa-backend")]
pub use device::alsa::AlsaDevice;
