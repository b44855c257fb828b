//! Sample-format-aware peak metering and VU bar rendering.
//!
//! The meter consumes the bytes of each accepted chunk, decodes them via
//! [`SampleFormat`], tracks per-channel peaks against full scale and draws
//! either a carriage-return-updated VU bar (mono or stereo) or a one-line
//! per-chunk diagnostic. Metering is strictly best-effort: it writes to the
//! status stream and never fails the transfer.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::format::SampleFormat;

/// Which channels the VU meter displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterMode {
    /// One bar over all channels.
    Mono,
    /// Side-by-side bars for a stereo stream.
    Stereo,
}

/// How meter output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeterStyle {
    /// Single line, redrawn in place with carriage returns.
    Bar,
    /// One diagnostic line per chunk (high verbosity).
    Diagnostic,
}

const MONO_BAR: i64 = 50;
const STEREO_BAR: i64 = 35;

/// Per-channel peak tracker and VU renderer.
pub struct PeakMeter {
    format: SampleFormat,
    mode: MeterMode,
    style: MeterStyle,
    out: Box<dyn Write>,
    /// This-second maxima, reset on wall-clock second boundaries.
    max_percent: [i64; 2],
    last_second: u64,
    unsupported_reported: bool,
    /// Reusable decode scratch, sized on first use.
    scratch: Vec<i32>,
}

impl PeakMeter {
    /// Creates a meter rendering to stderr.
    pub fn new(format: SampleFormat, mode: MeterMode, style: MeterStyle) -> Self {
        Self::with_output(format, mode, style, Box::new(std::io::stderr()))
    }

    /// Creates a meter rendering into an arbitrary writer (tests).
    pub fn with_output(
        format: SampleFormat,
        mode: MeterMode,
        style: MeterStyle,
        out: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            mode,
            style,
            out,
            max_percent: [0; 2],
            last_second: 0,
            unsupported_reported: false,
            scratch: Vec::new(),
        }
    }

    /// Feeds the bytes of one accepted chunk (or one channel of a planar
    /// chunk) into the meter.
    ///
    /// Returns the per-channel percentages that were computed, or `None`
    /// when the sample width is unsupported - in which case the condition
    /// is reported once and metering stays disabled for the stream.
    pub fn update(&mut self, data: &[u8]) -> Option<[i64; 2]> {
        self.scratch.clear();
        if !self.format.decode(data, &mut self.scratch) {
            if !self.unsupported_reported {
                self.unsupported_reported = true;
                let _ = writeln!(self.out, "Unsupported bit size {}.", self.format.bits);
            }
            return None;
        }

        let stereo = self.mode == MeterMode::Stereo;
        let mut peak = [0i64; 2];
        let mut channel = 0usize;
        for &amp in &self.scratch {
            let magnitude = i64::from(amp.saturating_abs());
            if magnitude > peak[channel] {
                peak[channel] = magnitude;
            }
            if stereo {
                channel ^= 1;
            }
        }

        let full = self.format.full_scale();
        let channels = if stereo { 2 } else { 1 };
        let mut percent = [0i64; 2];
        for c in 0..channels {
            if peak[c] > full {
                peak[c] = full;
            }
            // coarser precision above 16 bits to avoid overflow
            percent[c] = if self.format.bits > 16 {
                peak[c] / (full / 100)
            } else {
                peak[c] * 100 / full
            };
        }

        match self.style {
            MeterStyle::Bar => self.render_bar(percent, channels),
            MeterStyle::Diagnostic => self.render_diagnostic(peak[0], percent[0]),
        }
        Some(percent)
    }

    /// This-second maxima, for callers that want to display them elsewhere.
    pub fn max_percent(&self) -> [i64; 2] {
        self.max_percent
    }

    fn render_bar(&mut self, percent: [i64; 2], channels: usize) {
        let second = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if second > self.last_second {
            self.last_second = second;
            self.max_percent = [0; 2];
        }
        for c in 0..channels {
            if percent[c] > self.max_percent[c] {
                self.max_percent[c] = percent[c];
            }
        }

        let line = if channels == 2 {
            render_stereo(percent, self.max_percent)
        } else {
            render_mono(percent[0], self.max_percent[0])
        };
        let _ = write!(self.out, "\r{}", line);
        let _ = self.out.flush();
    }

    fn render_diagnostic(&mut self, peak: i64, percent: i64) {
        let mut bar = String::with_capacity(20);
        for cell in 0..20 {
            bar.push(if cell <= percent / 5 { '#' } else { ' ' });
        }
        let _ = writeln!(
            self.out,
            "Max peak ({} samples): 0x{:08x} {} {}%",
            self.scratch.len(),
            peak,
            bar,
            percent
        );
        let _ = self.out.flush();
    }
}

/// Draws the 50-cell mono bar: `#` up to the current level, `+` at the
/// this-second maximum, percentage tail.
fn render_mono(percent: i64, max_percent: i64) -> String {
    let mut line = String::with_capacity(64);
    let mut cell = 0i64;
    while cell <= percent * MONO_BAR / 100 && cell < MONO_BAR {
        line.push('#');
        cell += 1;
    }
    while cell <= max_percent * MONO_BAR / 100 && cell < MONO_BAR {
        line.push(' ');
        cell += 1;
    }
    line.push('+');
    cell += 1;
    while cell <= MONO_BAR {
        line.push(' ');
        cell += 1;
    }
    if max_percent > 99 {
        line.push_str("| MAX");
    } else {
        line.push_str(&format!("| {:02}%", max_percent));
    }
    if percent > 100 {
        line.push_str(" !clip  ");
    }
    line
}

/// Draws the stereo layout: left bar growing right-to-left, percentage
/// texts around a center divider, right bar growing left-to-right.
fn render_stereo(percent: [i64; 2], max_percent: [i64; 2]) -> String {
    let bar = STEREO_BAR as usize;
    let mut line = vec![b' '; bar * 2 + 8];
    line[bar + 3] = b'|';

    for c in 0..2 {
        let mut p = (percent[c] * STEREO_BAR / 100) as usize;
        if p > bar {
            p = bar;
        }
        if c == 1 {
            for cell in &mut line[bar + 7..bar + 7 + p] {
                *cell = b'#';
            }
        } else {
            for cell in &mut line[bar - p..bar] {
                *cell = b'#';
            }
        }

        let mut m = max_percent[c] * STEREO_BAR / 100 - 1;
        if m < 0 {
            m = 0;
        } else if m >= STEREO_BAR {
            m = STEREO_BAR - 1;
        }
        let m = m as usize;
        if c == 1 {
            line[bar + 7 + m] = b'+';
        } else {
            line[bar - m - 1] = b'+';
        }

        let text = if max_percent[c] > 99 {
            "MAX".to_string()
        } else {
            format!("{:02}%", max_percent[c])
        };
        let at = if c == 1 { bar + 4 } else { bar };
        line[at..at + 3].copy_from_slice(text.as_bytes());
    }

    String::from_utf8(line).expect("bar cells are ascii")
}
