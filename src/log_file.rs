//! Append-only activity log shared with the presentation layer.
//!
//! Each line is `"[<timestamp>] <message>"`. Writes are best effort: a log
//! that cannot be written never fails the operation being logged.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// How far back from the end [`ActivityLog::last_matching`] looks.
const SCAN_WINDOW: u64 = 64 * 1024;

/// Handle to the activity log file.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
}

impl ActivityLog {
    /// Creates a handle for `path`; the file is created on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one timestamped line.
    pub fn append(&self, message: &str) {
        let line = format!(
            "[{}] {}\n",
            chrono::Local::now().format(TIMESTAMP_FORMAT),
            message.replace('\n', " ")
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(e) = result {
            tracing::debug!(path = %self.path.display(), error = %e, "Cannot append to activity log");
        }
    }

    /// Entire log content, or `None` if it cannot be read.
    ///
    /// Bytes that are not valid UTF-8 are replaced, since other writers
    /// share the file.
    #[must_use]
    pub fn read_all(&self) -> Option<String> {
        let bytes = std::fs::read(&self.path).ok()?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Most recent message containing any of `needles`, without its
    /// timestamp prefix.
    ///
    /// Only the last [`SCAN_WINDOW`] bytes are searched.
    #[must_use]
    pub fn last_matching(&self, needles: &[&str]) -> Option<String> {
        let tail = self.read_tail(SCAN_WINDOW)?;
        tail.split(|&b| b == b'\n')
            .rev()
            .map(String::from_utf8_lossy)
            .find(|line| needles.iter().any(|n| line.contains(n)))
            .map(|line| strip_timestamp(&line).to_string())
    }

    /// Last `window` bytes of the file, starting at a line boundary.
    fn read_tail(&self, window: u64) -> Option<Vec<u8>> {
        let mut file = File::open(&self.path).ok()?;
        let len = file.metadata().ok()?.len();
        let start = len.saturating_sub(window);
        file.seek(SeekFrom::Start(start)).ok()?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).ok()?;
        if start > 0 {
            // Drop the partial first line.
            let cut = bytes.iter().position(|&b| b == b'\n').map_or(bytes.len(), |i| i + 1);
            bytes.drain(..cut);
        }
        Some(bytes)
    }
}

fn strip_timestamp(line: &str) -> &str {
    if line.starts_with('[') {
        if let Some(end) = line.find("] ") {
            return &line[end + 2..];
        }
    }
    line
}
