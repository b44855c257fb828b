//! Capture output file series: naming and rotation.
//!
//! Long captures are split across a series of files. Two naming schemes
//! exist:
//!
//! - **Counter** (default): the first file keeps the user-given name; when
//!   the series first rotates, that file is retroactively renamed to carry
//!   a `-01` suffix and subsequent files continue `-02`, `-03`, ... with
//!   indices never reused. (The backward-looking rename is long-standing
//!   user-visible behavior and is preserved exactly.)
//! - **Time pattern**: every file name - the first included - is produced
//!   by expanding the base name as a template at the moment of rotation:
//!   `%v` becomes the one-based file index, zero-padded to two digits, and
//!   every other `%` token goes to the calendar-time formatter.
//!
//! Rotation itself is triggered by whichever fires first: the per-file
//! byte budget (derived from the maximum file time), or an external
//! asynchronous request observed at chunk granularity.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::StreamError;

/// How file names in the series are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamePolicy {
    /// User-given name plus a two-digit counter suffix.
    #[default]
    Counter,
    /// The base name is a strftime-style template with `%v` for the index.
    TimePattern,
}

/// An ordered, conceptually infinite series of capture output files.
pub struct CaptureFileSeries {
    base: PathBuf,
    policy: NamePolicy,
    max_file_bytes: Option<u64>,
    /// Files opened so far. The counter suffix of file k (k ≥ 2) is
    /// exactly k, with the retroactive rename filling slot 1.
    opened: u32,
    bytes_in_file: u64,
}

impl CaptureFileSeries {
    /// Creates a series over the given base name.
    ///
    /// `max_file_bytes` of zero or `None` disables size-based rotation.
    pub fn new(
        base: impl Into<PathBuf>,
        policy: NamePolicy,
        max_file_bytes: Option<u64>,
    ) -> Self {
        Self {
            base: base.into(),
            policy,
            max_file_bytes: max_file_bytes.filter(|&m| m > 0),
            opened: 0,
            bytes_in_file: 0,
        }
    }

    /// Derives the per-file byte budget from a maximum file time.
    pub fn with_max_file_time(
        base: impl Into<PathBuf>,
        policy: NamePolicy,
        max_file_secs: u64,
        bytes_per_second: u64,
    ) -> Self {
        Self::new(base, policy, Some(max_file_secs * bytes_per_second))
    }

    /// Closes out the current target and opens the next one in the series.
    ///
    /// Computes the next name, performs the first-rotation retroactive
    /// rename in counter mode, replaces any existing regular file at the
    /// target, and creates missing parent directories before giving up.
    pub fn open_next(&mut self) -> Result<(File, PathBuf), StreamError> {
        let path = match self.policy {
            NamePolicy::Counter => {
                if self.opened == 0 {
                    self.base.clone()
                } else {
                    self.next_counter_name()
                }
            }
            NamePolicy::TimePattern => {
                let pattern = self.base.to_string_lossy();
                PathBuf::from(expand_pattern(&pattern, self.opened + 1, &Local::now())?)
            }
        };

        if let Ok(meta) = fs::symlink_metadata(&path) {
            if meta.is_file() {
                let _ = fs::remove_file(&path);
            }
        }
        let file = open_target(&path)?;

        self.opened += 1;
        self.bytes_in_file = 0;
        if self.opened > 1 {
            tracing::info!(path = %path.display(), index = self.opened, "rotated capture file");
        }
        Ok((file, path))
    }

    /// Accounts bytes written into the current file.
    pub fn note_written(&mut self, bytes: u64) {
        self.bytes_in_file += bytes;
    }

    /// Bytes written into the current file so far.
    pub fn bytes_in_file(&self) -> u64 {
        self.bytes_in_file
    }

    /// Whether the current file reached its byte budget.
    pub fn size_exceeded(&self) -> bool {
        self.max_file_bytes
            .is_some_and(|max| self.bytes_in_file >= max)
    }

    /// Bytes still allowed into the current file, if a budget is set.
    pub fn remaining_in_file(&self) -> Option<u64> {
        self.max_file_bytes
            .map(|max| max.saturating_sub(self.bytes_in_file))
    }

    /// Number of files opened so far.
    pub fn files_opened(&self) -> u32 {
        self.opened
    }

    /// One-based index of the file that [`open_next`](Self::open_next)
    /// would produce.
    pub fn next_index(&self) -> u32 {
        self.opened + 1
    }

    fn next_counter_name(&mut self) -> PathBuf {
        if self.opened == 1 {
            // first rotation: retroactively number the original file
            let renamed = self.numbered(1);
            let _ = fs::remove_file(&renamed);
            if let Err(err) = fs::rename(&self.base, &renamed) {
                tracing::warn!(
                    from = %self.base.display(),
                    to = %renamed.display(),
                    %err,
                    "could not rename first capture file"
                );
            }
        }
        self.numbered(self.opened + 1)
    }

    fn numbered(&self, index: u32) -> PathBuf {
        let stem = self.base.with_extension("");
        match self.base.extension() {
            Some(ext) => PathBuf::from(format!(
                "{}-{:02}.{}",
                stem.display(),
                index,
                ext.to_string_lossy()
            )),
            None => PathBuf::from(format!("{}-{:02}", stem.display(), index)),
        }
    }
}

/// Expands a time-pattern template.
///
/// `%v` becomes the zero-padded one-based file index; all other `%` tokens
/// are handed to the calendar formatter evaluated at `now`. An invalid
/// token or an empty result is a fatal pattern error.
pub(crate) fn expand_pattern(
    pattern: &str,
    index: u32,
    now: &DateTime<Local>,
) -> Result<String, StreamError> {
    let mut template = String::with_capacity(pattern.len() + 4);
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.peek() {
                Some('v') => {
                    chars.next();
                    template.push_str(&format!("{:02}", index));
                }
                Some(_) => {
                    template.push('%');
                    template.push(chars.next().expect("peeked"));
                }
                None => {}
            }
        } else {
            template.push(c);
        }
    }

    use std::fmt::Write as _;
    let mut out = String::new();
    if write!(out, "{}", now.format(&template)).is_err() || out.is_empty() {
        return Err(StreamError::Pattern {
            pattern: pattern.to_string(),
        });
    }
    Ok(out)
}

fn open_target(path: &Path) -> Result<File, StreamError> {
    let open = || OpenOptions::new().write(true).create(true).truncate(true).open(path);
    match open() {
        Ok(file) => Ok(file),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| StreamError::file(parent, e))?;
            }
            open().map_err(|e| StreamError::file(path, e))
        }
        Err(err) => Err(StreamError::file(path, err)),
    }
}
