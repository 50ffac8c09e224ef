//! Daemon PID file access.

use crate::error::{DaemonError, Result};
use std::path::{Path, PathBuf};

/// Reads the PID the daemon records on startup.
///
/// The file is re-read on every call; the daemon may restart (and get a new
/// PID) between two polls.
#[derive(Debug, Clone)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates a reader for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the PID file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and validates the PID.
    ///
    /// # Errors
    ///
    /// - [`DaemonError::PidFileNotFound`] if the file does not exist.
    /// - [`DaemonError::FileAccessDenied`] if it cannot be looked up or read
    ///   for any other reason.
    /// - [`DaemonError::InvalidPid`] if the trimmed content is not a
    ///   positive integer.
    pub fn read(&self) -> Result<u32> {
        let content = std::fs::metadata(&self.path)
            .and_then(|_| std::fs::read_to_string(&self.path))
            .map_err(|e| self.read_error(&e))?;

        parse_pid(&content)
    }

    fn read_error(&self, err: &std::io::Error) -> DaemonError {
        if err.kind() == std::io::ErrorKind::NotFound {
            return DaemonError::PidFileNotFound {
                path: self.path.clone(),
            };
        }
        tracing::debug!(path = %self.path.display(), error = %err, "Cannot read PID file");
        DaemonError::FileAccessDenied {
            path: self.path.clone(),
        }
    }
}

/// Parses PID file content: a positive decimal integer, surrounding
/// whitespace allowed.
fn parse_pid(content: &str) -> Result<u32> {
    let trimmed = content.trim();
    match trimmed.parse::<u32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(DaemonError::InvalidPid {
            content: trimmed.to_string(),
        }),
    }
}
