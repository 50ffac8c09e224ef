//! Error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias for supervisor operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

/// Errors returned by the liveness and command paths.
///
/// Telemetry does not use this type; see [`crate::telemetry`].
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The command pipe does not exist (daemon never started or removed it).
    #[error("command pipe not found at: {}", path.display())]
    PipeNotFound {
        /// The configured pipe path.
        path: PathBuf,
    },

    /// The daemon is not accepting commands.
    #[error("dnsproxy daemon is not running")]
    DaemonNotRunning,

    /// Writing a command to the pipe failed after it was opened.
    #[error("failed to send command: {command}")]
    CommandFailed {
        /// The command token.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A token outside the command whitelist was about to be sent.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// The PID file does not exist.
    #[error("PID file not found at: {}", path.display())]
    PidFileNotFound {
        /// The configured PID file path.
        path: PathBuf,
    },

    /// The PID file content is not a positive integer.
    #[error("invalid PID in daemon file: {content:?}")]
    InvalidPid {
        /// The trimmed file content.
        content: String,
    },

    /// No process with the expected name runs under the PID.
    #[error("process with PID {pid} not found")]
    ProcessNotFound {
        /// The PID read from the PID file.
        pid: u32,
    },

    /// A file owned by the daemon could not be read or opened.
    #[error("access denied to file: {}", path.display())]
    FileAccessDenied {
        /// The file that could not be accessed.
        path: PathBuf,
    },

    /// An external utility could not be run to completion.
    #[error("probe {} failed: {reason}", path.display())]
    ProbeFailed {
        /// The binary that was invoked.
        path: PathBuf,
        /// Launch error or timeout description.
        reason: String,
    },

    /// Invalid configuration values.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl DaemonError {
    /// Operator-facing hint for resolving the error.
    #[must_use]
    pub const fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::PipeNotFound { .. } => "Try restarting the daemon or check if it's running",
            Self::DaemonNotRunning => "Start the daemon using the launch agent",
            Self::CommandFailed { .. } => "Check daemon logs for more information",
            Self::InvalidCommand(_) => "Only `enable` and `disable` are accepted",
            Self::PidFileNotFound { .. } => "Start the daemon; it writes its PID on startup",
            Self::InvalidPid { .. } => "Remove the PID file and restart the daemon",
            Self::ProcessNotFound { .. } => "The daemon process may have crashed. Restart it.",
            Self::FileAccessDenied { .. } => "Check file permissions and try again",
            Self::ProbeFailed { .. } => "Check that the system utility exists and is executable",
            Self::ConfigurationError(_) => "Verify configuration files and paths",
        }
    }

    /// Returns `true` if the error just means the daemon is not up.
    #[must_use]
    pub const fn is_not_running(&self) -> bool {
        matches!(
            self,
            Self::DaemonNotRunning | Self::PidFileNotFound { .. } | Self::ProcessNotFound { .. }
        )
    }
}

/// Failure to run an external utility.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The binary could not be spawned (missing, not executable, ...).
    #[error("failed to launch {}: {source}", path.display())]
    Launch {
        /// The attempted binary path.
        path: PathBuf,
        /// The spawn error.
        #[source]
        source: std::io::Error,
    },

    /// The process did not exit within the allotted time and was killed.
    #[error("{} did not finish within {timeout:?}", path.display())]
    TimedOut {
        /// The attempted binary path.
        path: PathBuf,
        /// The bound that elapsed.
        timeout: Duration,
    },
}

impl ProbeError {
    /// The binary this failure refers to.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Launch { path, .. } | Self::TimedOut { path, .. } => path,
        }
    }
}

impl From<ProbeError> for DaemonError {
    fn from(err: ProbeError) -> Self {
        Self::ProbeFailed {
            path: err.path().to_path_buf(),
            reason: err.to_string(),
        }
    }
}
