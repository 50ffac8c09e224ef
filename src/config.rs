//! Controller configuration.

use crate::error::{DaemonError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default PID file written by the daemon.
pub const DEFAULT_PID_FILE: &str = "/tmp/dnsproxy.pid";

/// Default command pipe read by the daemon.
pub const DEFAULT_COMMAND_PIPE: &str = "/tmp/adguard-cmd-pipe";

/// Default activity log shared with the presentation layer.
pub const DEFAULT_LOG_FILE: &str = "/tmp/adguard-dns-toggle-app.log";

/// Restricted `PATH` handed to every external utility.
pub const DEFAULT_PROBE_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

/// Paths, timings and probe targets for the controller.
///
/// # Example
///
/// ```
/// use dnsproxy_controller::ControllerConfig;
/// use std::time::Duration;
///
/// let config = ControllerConfig::new()
///     .with_pid_file("/var/run/dnsproxy.pid")
///     .with_status_interval(Duration::from_secs(10));
///
/// assert_eq!(config.pid_file.to_str(), Some("/var/run/dnsproxy.pid"));
/// assert_eq!(config.daemon_marker, "dnsproxy");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// File holding the daemon's PID.
    pub pid_file: PathBuf,

    /// Named pipe the daemon reads commands from.
    pub command_pipe: PathBuf,

    /// Append-only activity log.
    pub log_file: PathBuf,

    /// Shared temp directory probed by diagnostics.
    pub temp_dir: PathBuf,

    /// Substring that must appear in the `ps` listing for the daemon's PID.
    pub daemon_marker: String,

    /// `PATH` for external utilities; the ambient one is never inherited.
    pub probe_path: String,

    /// Upper bound on every external utility invocation.
    pub probe_timeout: Duration,

    /// Liveness poll period.
    pub status_interval: Duration,

    /// Telemetry poll period.
    pub telemetry_interval: Duration,

    /// Remote DNS host used for the connectivity probe.
    pub latency_host: String,

    /// Port of the connectivity probe. Standard DNS is 53.
    pub latency_port: u16,

    /// Give-up bound for the connectivity probe.
    pub latency_timeout: Duration,

    /// Network service checked by the diagnostics DNS spot check.
    pub diagnostics_service: String,
}

impl ControllerConfig {
    /// Creates a config with the well-known daemon paths.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pid_file: PathBuf::from(DEFAULT_PID_FILE),
            command_pipe: PathBuf::from(DEFAULT_COMMAND_PIPE),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            temp_dir: PathBuf::from("/tmp"),
            daemon_marker: "dnsproxy".to_string(),
            probe_path: DEFAULT_PROBE_PATH.to_string(),
            probe_timeout: Duration::from_secs(5),
            status_interval: Duration::from_secs(3),
            telemetry_interval: Duration::from_secs(5),
            latency_host: "dns.adguard.com".to_string(),
            latency_port: 53,
            latency_timeout: Duration::from_secs(3),
            diagnostics_service: "Wi-Fi".to_string(),
        }
    }

    /// Overrides the PID file path.
    #[must_use]
    pub fn with_pid_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pid_file = path.into();
        self
    }

    /// Overrides the command pipe path.
    #[must_use]
    pub fn with_command_pipe(mut self, path: impl Into<PathBuf>) -> Self {
        self.command_pipe = path.into();
        self
    }

    /// Overrides the activity log path.
    #[must_use]
    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = path.into();
        self
    }

    /// Overrides the shared temp directory.
    #[must_use]
    pub fn with_temp_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.temp_dir = path.into();
        self
    }

    /// Overrides the process-name marker.
    #[must_use]
    pub fn with_daemon_marker(mut self, marker: impl Into<String>) -> Self {
        self.daemon_marker = marker.into();
        self
    }

    /// Overrides the external utility timeout.
    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Overrides the liveness poll period.
    #[must_use]
    pub const fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    /// Overrides the telemetry poll period.
    #[must_use]
    pub const fn with_telemetry_interval(mut self, interval: Duration) -> Self {
        self.telemetry_interval = interval;
        self
    }

    /// Overrides the connectivity probe target.
    #[must_use]
    pub fn with_latency_target(mut self, host: impl Into<String>, port: u16) -> Self {
        self.latency_host = host.into();
        self.latency_port = port;
        self
    }

    /// Overrides the connectivity probe give-up bound.
    #[must_use]
    pub const fn with_latency_timeout(mut self, timeout: Duration) -> Self {
        self.latency_timeout = timeout;
        self
    }

    /// Overrides the diagnostics DNS spot-check service.
    #[must_use]
    pub fn with_diagnostics_service(mut self, service: impl Into<String>) -> Self {
        self.diagnostics_service = service.into();
        self
    }

    /// Checks for values that would make the controller misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::ConfigurationError`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let paths = [
            ("pid_file", &self.pid_file),
            ("command_pipe", &self.command_pipe),
            ("log_file", &self.log_file),
            ("temp_dir", &self.temp_dir),
        ];
        for (name, path) in paths {
            if path.as_os_str().is_empty() {
                return Err(DaemonError::ConfigurationError(format!("{name} is empty")));
            }
        }
        if self.daemon_marker.trim().is_empty() {
            return Err(DaemonError::ConfigurationError(
                "daemon_marker is empty".to_string(),
            ));
        }
        if self.latency_host.trim().is_empty() {
            return Err(DaemonError::ConfigurationError(
                "latency_host is empty".to_string(),
            ));
        }
        let durations = [
            ("probe_timeout", self.probe_timeout),
            ("status_interval", self.status_interval),
            ("telemetry_interval", self.telemetry_interval),
            ("latency_timeout", self.latency_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(DaemonError::ConfigurationError(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}
