//! On-demand diagnostics report.
//!
//! Every check runs regardless of earlier failures, and every section is
//! always present; a failing probe shows up as a `FAIL` line rather than a
//! missing one.

use crate::config::ControllerConfig;
use crate::probe::{CommandRunner, Tool};
use crate::supervisor::DaemonSupervisor;
use crate::telemetry::TelemetryCollector;
use crate::util::{is_executable, is_process_alive, is_readable, is_writable};
use chrono::{DateTime, Local};
use std::fmt;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::path::Path;

/// Section titles, in report order.
pub const SECTIONS: [&str; 7] = [
    "PID file",
    "Command pipe",
    "Daemon process",
    "External binaries",
    "Temp directory",
    "DNS configuration",
    "System",
];

/// Result of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The check succeeded.
    Pass,
    /// The check failed.
    Fail,
}

/// One line of the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// What was checked.
    pub name: String,
    /// Pass or fail.
    pub outcome: Outcome,
    /// Observed value or error.
    pub detail: String,
}

impl Check {
    fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            outcome: if passed { Outcome::Pass } else { Outcome::Fail },
            detail: detail.into(),
        }
    }

    /// Returns `true` if the check passed.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }
}

/// A titled group of checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// One of [`SECTIONS`].
    pub title: &'static str,
    /// The checks, in execution order.
    pub checks: Vec<Check>,
}

/// Immutable diagnostics document, generated fresh per request.
#[derive(Debug, Clone)]
pub struct DiagnosticsReport {
    /// Generation time.
    pub generated_at: DateTime<Local>,
    /// Always [`SECTIONS`]`.len()` entries.
    pub sections: Vec<Section>,
}

impl DiagnosticsReport {
    /// Number of failed checks across all sections.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| &s.checks)
            .filter(|c| !c.passed())
            .count()
    }

    /// Section by title.
    #[must_use]
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.title == title)
    }
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Diagnostics report ({})",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        )?;
        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "== {} ==", section.title)?;
            for check in &section.checks {
                let tag = match check.outcome {
                    Outcome::Pass => "OK  ",
                    Outcome::Fail => "FAIL",
                };
                writeln!(f, "[{tag}] {}: {}", check.name, check.detail)?;
            }
        }
        write!(f, "\n{} check(s) failed", self.failures())
    }
}

/// Runs the diagnostics checks.
pub struct Diagnostics<'a, S, T> {
    config: &'a ControllerConfig,
    supervisor: &'a DaemonSupervisor<S>,
    collector: &'a TelemetryCollector<T>,
}

impl<'a, S: CommandRunner, T: CommandRunner> Diagnostics<'a, S, T> {
    /// Creates a diagnostics run over the given components.
    #[must_use]
    pub const fn new(
        config: &'a ControllerConfig,
        supervisor: &'a DaemonSupervisor<S>,
        collector: &'a TelemetryCollector<T>,
    ) -> Self {
        Self {
            config,
            supervisor,
            collector,
        }
    }

    /// Runs every check and assembles the report.
    pub async fn run(&self) -> DiagnosticsReport {
        tracing::info!("Running diagnostics");
        let sections = vec![
            Section {
                title: SECTIONS[0],
                checks: self.pid_file_checks(),
            },
            Section {
                title: SECTIONS[1],
                checks: self.pipe_checks(),
            },
            Section {
                title: SECTIONS[2],
                checks: self.process_checks().await,
            },
            Section {
                title: SECTIONS[3],
                checks: binary_checks(),
            },
            Section {
                title: SECTIONS[4],
                checks: temp_dir_checks(&self.config.temp_dir),
            },
            Section {
                title: SECTIONS[5],
                checks: self.dns_checks().await,
            },
            Section {
                title: SECTIONS[6],
                checks: self.system_checks().await,
            },
        ];

        let report = DiagnosticsReport {
            generated_at: Local::now(),
            sections,
        };
        tracing::info!(failures = report.failures(), "Diagnostics finished");
        report
    }

    fn pid_file_checks(&self) -> Vec<Check> {
        let path = self.supervisor.pid_file().path();
        let mut checks = file_checks(path);
        checks.push(match self.supervisor.pid_file().read() {
            Ok(pid) => Check::new("content", true, format!("pid {pid}")),
            Err(e) => Check::new("content", false, e.to_string()),
        });
        checks
    }

    fn pipe_checks(&self) -> Vec<Check> {
        let path = self.supervisor.channel().path();
        let mut checks = file_checks(path);
        let is_fifo = std::fs::metadata(path).is_ok_and(|m| m.file_type().is_fifo());
        checks.push(Check::new(
            "named pipe",
            is_fifo,
            if is_fifo { "yes" } else { "not a FIFO" },
        ));
        let writable = is_writable(path);
        checks.push(Check::new(
            "writable",
            writable,
            if writable { "yes" } else { "no" },
        ));
        checks
    }

    async fn process_checks(&self) -> Vec<Check> {
        let pid = self.supervisor.pid_file().read().ok();
        let listing = match pid {
            Some(pid) => match self.supervisor.check_process(pid).await {
                Ok(()) => Check::new(
                    "process listing",
                    true,
                    format!("pid {pid} is {}", self.config.daemon_marker),
                ),
                Err(e) => Check::new("process listing", false, e.to_string()),
            },
            None => Check::new("process listing", false, "no PID available"),
        };
        let signal = match pid {
            Some(pid) => {
                let alive = is_process_alive(pid);
                Check::new(
                    "signal 0",
                    alive,
                    if alive { "process exists" } else { "no such process" },
                )
            }
            None => Check::new("signal 0", false, "no PID available"),
        };
        vec![listing, signal]
    }

    async fn dns_checks(&self) -> Vec<Check> {
        let service = &self.config.diagnostics_service;
        let name = format!("servers for {service}");
        let check = match self
            .supervisor
            .runner()
            .run(Tool::NetworkSetup, &["-getdnsservers", service])
            .await
        {
            Ok(out) if out.success => {
                let servers: Vec<&str> = out
                    .stdout
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .collect();
                Check::new(&name, true, servers.join(", "))
            }
            Ok(out) => Check::new(&name, false, out.stderr.trim().to_string()),
            Err(e) => Check::new(&name, false, e.to_string()),
        };
        vec![check]
    }

    async fn system_checks(&self) -> Vec<Check> {
        let os = match self.collector.system_version().await {
            Some(version) => Check::new("os version", true, version),
            None => Check::new("os version", false, "unavailable"),
        };
        let controller = Check::new("controller version", true, env!("CARGO_PKG_VERSION"));
        vec![os, controller]
    }
}

/// Existence and permission bits.
fn file_checks(path: &Path) -> Vec<Check> {
    let shown = path.display().to_string();
    match std::fs::metadata(path) {
        Ok(meta) => vec![
            Check::new("exists", true, shown),
            Check::new(
                "permissions",
                is_readable(path),
                format!("{:o}", meta.permissions().mode() & 0o7777),
            ),
        ],
        Err(e) => vec![
            Check::new("exists", false, format!("{shown}: {e}")),
            Check::new("permissions", false, "n/a"),
        ],
    }
}

fn binary_checks() -> Vec<Check> {
    Tool::ALL
        .into_iter()
        .map(|tool| {
            let path = Path::new(tool.path());
            let ok = is_executable(path);
            Check::new(
                tool.path(),
                ok,
                if ok { "executable" } else { "missing or not executable" },
            )
        })
        .collect()
}

/// Writes a marker file into `dir`, then removes it.
fn temp_dir_checks(dir: &Path) -> Vec<Check> {
    let marker = dir.join(format!(".dnsctl-diagnostics-{}", std::process::id()));
    let written = std::fs::write(&marker, b"diagnostics\n");
    let write_check = match &written {
        Ok(()) => Check::new("write marker", true, marker.display().to_string()),
        Err(e) => Check::new("write marker", false, format!("{}: {e}", dir.display())),
    };
    let remove_check = if written.is_ok() {
        match std::fs::remove_file(&marker) {
            Ok(()) => Check::new("remove marker", true, "removed"),
            Err(e) => Check::new("remove marker", false, e.to_string()),
        }
    } else {
        Check::new("remove marker", false, "skipped, nothing written")
    };
    vec![write_check, remove_check]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::make_fifo;
    use crate::probe::ProbeOutput;
    use crate::probe::testing::ScriptedRunner;

    fn config(dir: &Path) -> ControllerConfig {
        ControllerConfig::new()
            .with_pid_file(dir.join("dnsproxy.pid"))
            .with_command_pipe(dir.join("cmd-pipe"))
            .with_log_file(dir.join("app.log"))
            .with_temp_dir(dir)
    }

    async fn run(cfg: &ControllerConfig, runner: ScriptedRunner) -> DiagnosticsReport {
        let supervisor = DaemonSupervisor::new(cfg, runner);
        let collector = TelemetryCollector::new(
            cfg,
            ScriptedRunner::new().reply(Tool::SwVers, "-productVersion", ProbeOutput::ok("14.5\n")),
        );
        Diagnostics::new(cfg, &supervisor, &collector).run().await
    }

    fn titles(report: &DiagnosticsReport) -> Vec<&str> {
        report.sections.iter().map(|s| s.title).collect()
    }

    #[tokio::test]
    async fn healthy_setup() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let pid = std::process::id();
        std::fs::write(&cfg.pid_file, pid.to_string()).unwrap();
        make_fifo(&cfg.command_pipe);

        let runner = ScriptedRunner::new()
            .reply(
                Tool::Ps,
                &format!("-p {pid}"),
                ProbeOutput::ok(format!("{pid} ?? 0:00.10 dnsproxy\n")),
            )
            .reply(Tool::NetworkSetup, "-getdnsservers Wi-Fi", ProbeOutput::ok("127.0.0.1\n"));
        let report = run(&cfg, runner).await;

        assert_eq!(titles(&report), SECTIONS);
        for title in ["PID file", "Command pipe", "Daemon process", "Temp directory", "DNS configuration", "System"] {
            let section = report.section(title).unwrap();
            assert!(section.checks.iter().all(Check::passed), "{title}: {section:?}");
        }
        assert_eq!(
            report.section("DNS configuration").unwrap().checks[0].detail,
            "127.0.0.1"
        );
        // The marker file does not survive the run.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn failed_write_check_does_not_abort_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path()).with_temp_dir(dir.path().join("missing"));

        let report = run(&cfg, ScriptedRunner::new()).await;

        assert_eq!(titles(&report), SECTIONS);
        let temp = report.section("Temp directory").unwrap();
        assert_eq!(temp.checks.len(), 2);
        assert!(temp.checks.iter().all(|c| !c.passed()));
        assert_eq!(report.section("PID file").unwrap().checks.len(), 3);
        assert_eq!(report.section("Command pipe").unwrap().checks.len(), 4);
        assert_eq!(report.section("Daemon process").unwrap().checks.len(), 2);
        assert_eq!(
            report.section("External binaries").unwrap().checks.len(),
            Tool::ALL.len()
        );
        assert!(report.section("System").unwrap().checks[0].passed());
    }

    #[tokio::test]
    async fn report_text_lists_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(&config(dir.path()), ScriptedRunner::new()).await;
        let text = report.to_string();
        for title in SECTIONS {
            assert!(text.contains(&format!("== {title} ==")), "{title}");
        }
        assert!(text.contains("[FAIL] exists"));
        assert!(text.ends_with(&format!("{} check(s) failed", report.failures())));
    }
}
