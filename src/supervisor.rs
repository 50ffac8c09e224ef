//! Daemon liveness, resource usage and command delivery.

use crate::channel::CommandChannel;
use crate::command::DaemonCommand;
use crate::config::ControllerConfig;
use crate::error::{DaemonError, Result};
use crate::log_file::ActivityLog;
use crate::parse;
use crate::pid_file::PidFile;
use crate::probe::{CommandRunner, Tool};
use std::fmt;

/// Sentinel for uptime/memory when the daemon is not running.
pub const NOT_RUNNING: &str = "NotRunning";

/// Sentinel for uptime/memory when the probe itself failed.
pub const UNKNOWN: &str = "Unknown";

/// Daemon state as of one poll. Never cached across polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    /// The PID file resolves to a live daemon process.
    Running {
        /// Daemon PID.
        pid: u32,
        /// Elapsed time as printed by `ps`, or a sentinel.
        uptime: String,
        /// Resident memory as `"x.y MB"`, or a sentinel.
        memory: String,
    },
    /// No PID file, or the PID does not belong to the daemon.
    NotRunning,
    /// Liveness could not be determined.
    Unknown(String),
}

impl DaemonState {
    /// Returns `true` for [`DaemonState::Running`].
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running {
                pid,
                uptime,
                memory,
            } => write!(f, "running (pid {pid}, up {uptime}, {memory})"),
            Self::NotRunning => f.write_str("not running"),
            Self::Unknown(reason) => write!(f, "unknown ({reason})"),
        }
    }
}

/// Answers "is the daemon alive" and forwards enable/disable commands.
///
/// Stateless between calls: the PID file and process table are consulted
/// afresh every time.
pub struct DaemonSupervisor<R> {
    pid_file: PidFile,
    channel: CommandChannel,
    runner: R,
    marker: String,
    log: ActivityLog,
}

impl<R: CommandRunner> DaemonSupervisor<R> {
    /// Creates a supervisor for the daemon described by `config`.
    #[must_use]
    pub fn new(config: &ControllerConfig, runner: R) -> Self {
        Self {
            pid_file: PidFile::new(&config.pid_file),
            channel: CommandChannel::new(&config.command_pipe),
            runner,
            marker: config.daemon_marker.clone(),
            log: ActivityLog::new(&config.log_file),
        }
    }

    /// The PID file this supervisor reads.
    #[must_use]
    pub const fn pid_file(&self) -> &PidFile {
        &self.pid_file
    }

    /// The command channel this supervisor writes.
    #[must_use]
    pub const fn channel(&self) -> &CommandChannel {
        &self.channel
    }

    /// The utility runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Returns `true` only if the PID file holds a PID whose `ps` listing
    /// mentions the daemon binary.
    ///
    /// Every failure (missing or garbled PID file, unrelated process,
    /// probe failure) reads as "not running".
    pub async fn is_running(&self) -> bool {
        let pid = match self.pid_file.read() {
            Ok(pid) => pid,
            Err(e) => {
                tracing::debug!(error = %e, "Daemon PID unavailable");
                return false;
            }
        };

        match self.check_process(pid).await {
            Ok(()) => {
                tracing::debug!(pid, "Daemon is running");
                true
            }
            Err(e) => {
                tracing::debug!(pid, error = %e, "Daemon is not running");
                false
            }
        }
    }

    /// Verifies that `pid` is a process whose listing contains the marker.
    ///
    /// # Errors
    ///
    /// [`DaemonError::ProcessNotFound`] if it is not, or
    /// [`DaemonError::ProbeFailed`] if `ps` could not be run.
    pub async fn check_process(&self, pid: u32) -> Result<()> {
        let pid_arg = pid.to_string();
        let output = self.runner.run(Tool::Ps, &["-p", &pid_arg]).await?;
        tracing::trace!(pid, output = %output.stdout, "ps listing");

        if parse::listing_contains(&output.stdout, &self.marker) {
            Ok(())
        } else {
            Err(DaemonError::ProcessNotFound { pid })
        }
    }

    /// Full state for one poll, including uptime and memory when running.
    pub async fn daemon_state(&self) -> DaemonState {
        let pid = match self.pid_file.read() {
            Ok(pid) => pid,
            Err(e) if e.is_not_running() => return DaemonState::NotRunning,
            Err(e) => return DaemonState::Unknown(e.to_string()),
        };

        match self.check_process(pid).await {
            Ok(()) => {}
            Err(e) if e.is_not_running() => return DaemonState::NotRunning,
            Err(e) => return DaemonState::Unknown(e.to_string()),
        }

        let (uptime, memory) = tokio::join!(self.uptime_of(pid), self.memory_of(pid));
        DaemonState::Running {
            pid,
            uptime,
            memory,
        }
    }

    /// Sends `command` to the daemon.
    ///
    /// Failures are also appended to the activity log.
    ///
    /// # Errors
    ///
    /// Propagates [`CommandChannel::send`] errors.
    pub fn send_command(&self, command: DaemonCommand) -> Result<()> {
        tracing::info!(command = %command, "Sending command");
        self.channel.send(command).inspect_err(|e| {
            tracing::error!(command = %command, error = %e, "Failed to send command");
            self.log
                .append(&format!("command: failed to send {command}: {e}"));
        })
    }

    /// Parses `token` against the whitelist and sends it.
    ///
    /// # Errors
    ///
    /// [`DaemonError::InvalidCommand`] before any I/O if `token` is not
    /// whitelisted; otherwise as [`send_command`](Self::send_command).
    pub fn send_token(&self, token: &str) -> Result<()> {
        let command = token.parse::<DaemonCommand>().inspect_err(|_| {
            tracing::error!(token, "Refusing to send invalid command");
        })?;
        self.send_command(command)
    }

    /// Daemon elapsed time as printed by `ps`, or [`NOT_RUNNING`] /
    /// [`UNKNOWN`].
    pub async fn uptime(&self) -> String {
        match self.pid_file.read() {
            Ok(pid) => self.uptime_of(pid).await,
            Err(_) => NOT_RUNNING.to_string(),
        }
    }

    /// Daemon resident memory as `"x.y MB"`, or [`NOT_RUNNING`] /
    /// [`UNKNOWN`].
    pub async fn memory_usage_mb(&self) -> String {
        match self.pid_file.read() {
            Ok(pid) => self.memory_of(pid).await,
            Err(_) => NOT_RUNNING.to_string(),
        }
    }

    async fn uptime_of(&self, pid: u32) -> String {
        let pid_arg = pid.to_string();
        match self.runner.run(Tool::Ps, &["-o", "etime=", "-p", &pid_arg]).await {
            Ok(out) => parse::elapsed_time(&out.stdout).unwrap_or_else(|| NOT_RUNNING.to_string()),
            Err(e) => {
                tracing::warn!(pid, error = %e, "Uptime probe failed");
                UNKNOWN.to_string()
            }
        }
    }

    async fn memory_of(&self, pid: u32) -> String {
        let pid_arg = pid.to_string();
        match self.runner.run(Tool::Ps, &["-o", "rss=", "-p", &pid_arg]).await {
            Ok(out) if out.stdout.trim().is_empty() => NOT_RUNNING.to_string(),
            Ok(out) => parse::rss_megabytes(&out.stdout).unwrap_or_else(|| UNKNOWN.to_string()),
            Err(e) => {
                tracing::warn!(pid, error = %e, "Memory probe failed");
                UNKNOWN.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeOutput;
    use crate::probe::testing::ScriptedRunner;
    use std::path::Path;

    const LISTING: &str =
        "  PID TTY           TIME CMD\n 1234 ??         0:00.42 /opt/homebrew/bin/dnsproxy -l 127.0.0.1\n";
    const EMPTY_LISTING: &str = "  PID TTY           TIME CMD\n";

    fn config(dir: &Path) -> ControllerConfig {
        ControllerConfig::new()
            .with_pid_file(dir.join("dnsproxy.pid"))
            .with_command_pipe(dir.join("cmd-pipe"))
            .with_log_file(dir.join("app.log"))
    }

    fn running_runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .reply(Tool::Ps, "-p 1234", ProbeOutput::ok(LISTING))
            .reply(Tool::Ps, "-o etime= -p 1234", ProbeOutput::ok("   01:02:03\n"))
            .reply(Tool::Ps, "-o rss= -p 1234", ProbeOutput::ok(" 20480\n"))
    }

    #[tokio::test]
    async fn absent_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let sup = DaemonSupervisor::new(&config(dir.path()), running_runner());
        assert!(!sup.is_running().await);
        assert_eq!(sup.daemon_state().await, DaemonState::NotRunning);
        assert_eq!(sup.uptime().await, NOT_RUNNING);
        assert_eq!(sup.memory_usage_mb().await, NOT_RUNNING);
        assert!(sup.runner().calls().is_empty());
    }

    #[tokio::test]
    async fn garbled_pid_file_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dnsproxy.pid"), "dnsproxy\n").unwrap();
        let sup = DaemonSupervisor::new(&config(dir.path()), running_runner());
        assert!(!sup.is_running().await);
        assert!(matches!(sup.daemon_state().await, DaemonState::Unknown(_)));
    }

    #[tokio::test]
    async fn pid_reused_by_other_process_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dnsproxy.pid"), "1234").unwrap();
        let runner = ScriptedRunner::new().reply(
            Tool::Ps,
            "-p 1234",
            ProbeOutput::ok("  PID TTY           TIME CMD\n 1234 ??         0:00.01 /usr/bin/vim\n"),
        );
        let sup = DaemonSupervisor::new(&config(dir.path()), runner);
        assert!(!sup.is_running().await);
        assert_eq!(sup.daemon_state().await, DaemonState::NotRunning);
    }

    #[tokio::test]
    async fn vanished_pid_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dnsproxy.pid"), "1234").unwrap();
        let runner = ScriptedRunner::new().reply(Tool::Ps, "-p 1234", ProbeOutput {
            stdout: EMPTY_LISTING.to_string(),
            stderr: String::new(),
            success: false,
        });
        let sup = DaemonSupervisor::new(&config(dir.path()), runner);
        assert!(!sup.is_running().await);
    }

    #[tokio::test]
    async fn running_daemon_reports_uptime_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dnsproxy.pid"), "1234\n").unwrap();
        let sup = DaemonSupervisor::new(&config(dir.path()), running_runner());

        assert!(sup.is_running().await);
        assert_eq!(sup.uptime().await, "01:02:03");
        assert_eq!(sup.memory_usage_mb().await, "20.0 MB");
        assert_eq!(
            sup.daemon_state().await,
            DaemonState::Running {
                pid: 1234,
                uptime: "01:02:03".to_string(),
                memory: "20.0 MB".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn probe_failure_is_unknown_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dnsproxy.pid"), "1234").unwrap();
        let runner = ScriptedRunner::new()
            .timeout(Tool::Ps, "-p 1234")
            .timeout(Tool::Ps, "-o etime= -p 1234");
        let sup = DaemonSupervisor::new(&config(dir.path()), runner);

        assert!(!sup.is_running().await);
        assert!(matches!(sup.daemon_state().await, DaemonState::Unknown(r) if r.contains("/bin/ps")));
        assert_eq!(sup.uptime().await, UNKNOWN);
        assert_eq!(sup.memory_usage_mb().await, UNKNOWN);
    }

    #[tokio::test]
    async fn exited_process_memory_and_uptime_are_not_running() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dnsproxy.pid"), "1234").unwrap();
        let runner = ScriptedRunner::new()
            .reply(Tool::Ps, "-o etime= -p 1234", ProbeOutput::failed(""))
            .reply(Tool::Ps, "-o rss= -p 1234", ProbeOutput::failed(""));
        let sup = DaemonSupervisor::new(&config(dir.path()), runner);
        assert_eq!(sup.uptime().await, NOT_RUNNING);
        assert_eq!(sup.memory_usage_mb().await, NOT_RUNNING);
    }

    #[test]
    fn send_to_missing_pipe_fails_and_is_logged() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let sup = DaemonSupervisor::new(&cfg, ScriptedRunner::new());

        let err = sup.send_command(DaemonCommand::Enable).unwrap_err();
        assert!(matches!(err, DaemonError::PipeNotFound { .. }));
        assert!(!cfg.command_pipe.exists());

        let log = ActivityLog::new(&cfg.log_file);
        assert!(log.last_matching(&["command:"]).unwrap().contains("enable"));
    }

    #[test]
    fn invalid_token_is_rejected_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        std::fs::write(&cfg.command_pipe, "").unwrap();
        let sup = DaemonSupervisor::new(&cfg, ScriptedRunner::new());

        for token in ["", "Enable", "restart"] {
            assert!(matches!(
                sup.send_token(token),
                Err(DaemonError::InvalidCommand(_))
            ));
        }
        assert_eq!(std::fs::read_to_string(&cfg.command_pipe).unwrap(), "");

        sup.send_token("enable").unwrap();
        assert_eq!(std::fs::read_to_string(&cfg.command_pipe).unwrap(), "enable\n");
    }
}
