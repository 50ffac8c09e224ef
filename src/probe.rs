//! External utility invocation.
//!
//! Every probe goes through [`run_command`]: a hard-coded binary path, a
//! fixed argument list, a cleared environment with only a restricted `PATH`,
//! and a bounded wait. Nothing here ever interpolates user input into a
//! shell.

use crate::error::ProbeError;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// The allow-list of utilities the controller may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    /// Process listing (`ps`).
    Ps,
    /// System configuration utility, used for `--dns`.
    Scutil,
    /// Network service and hardware port configuration.
    NetworkSetup,
    /// Routing table queries.
    Route,
    /// OS version.
    SwVers,
}

impl Tool {
    /// Every allowed utility, in diagnostics order.
    pub const ALL: [Self; 5] = [
        Self::Ps,
        Self::Scutil,
        Self::NetworkSetup,
        Self::Route,
        Self::SwVers,
    ];

    /// Absolute path of the binary.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Ps => "/bin/ps",
            Self::Scutil => "/usr/sbin/scutil",
            Self::NetworkSetup => "/usr/sbin/networksetup",
            Self::Route => "/sbin/route",
            Self::SwVers => "/usr/bin/sw_vers",
        }
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeOutput {
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
}

impl ProbeOutput {
    /// A successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    /// A failed output (non-zero exit) with the given stderr.
    #[must_use]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }
}

/// Runs `path` with `args` and waits at most `timeout`.
///
/// The child sees only `PATH=<search_path>`. A non-zero exit is returned as
/// a normal [`ProbeOutput`] with `success == false`; callers decide whether
/// it matters. A child still running when the timeout elapses is killed.
///
/// # Errors
///
/// Returns [`ProbeError::Launch`] if the process cannot be spawned and
/// [`ProbeError::TimedOut`] if it does not exit in time.
pub async fn run_command(
    path: &Path,
    args: &[&str],
    search_path: &str,
    timeout: Duration,
) -> Result<ProbeOutput, ProbeError> {
    let mut command = Command::new(path);
    command
        .args(args)
        .env_clear()
        .env("PATH", search_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| ProbeError::Launch {
        path: path.to_path_buf(),
        source,
    })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => {
            return Err(ProbeError::Launch {
                path: path.to_path_buf(),
                source,
            });
        }
        Err(_) => {
            tracing::warn!(path = %path.display(), ?timeout, "Probe timed out, killing it");
            return Err(ProbeError::TimedOut {
                path: path.to_path_buf(),
                timeout,
            });
        }
    };

    let result = ProbeOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
    };
    tracing::debug!(
        path = %path.display(),
        ?args,
        success = result.success,
        stdout_len = result.stdout.len(),
        "Probe finished"
    );
    Ok(result)
}

/// Something that can run an allow-listed utility.
///
/// [`SystemRunner`] is the real implementation; tests substitute scripted
/// output.
pub trait CommandRunner: Send + Sync {
    /// Runs `tool` with `args`.
    fn run(
        &self,
        tool: Tool,
        args: &[&str],
    ) -> impl Future<Output = Result<ProbeOutput, ProbeError>> + Send;
}

/// Runs utilities on the host via [`run_command`].
#[derive(Debug, Clone)]
pub struct SystemRunner {
    search_path: String,
    timeout: Duration,
}

impl SystemRunner {
    /// Creates a runner with an explicit `PATH` and per-call timeout.
    #[must_use]
    pub fn new(search_path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            search_path: search_path.into(),
            timeout,
        }
    }

    /// Creates a runner from the controller config.
    #[must_use]
    pub fn from_config(config: &crate::ControllerConfig) -> Self {
        Self::new(config.probe_path.clone(), config.probe_timeout)
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, tool: Tool, args: &[&str]) -> Result<ProbeOutput, ProbeError> {
        let path = PathBuf::from(tool.path());
        run_command(&path, args, &self.search_path, self.timeout).await
    }
}
