//! # dnsproxy-controller
//!
//! Supervise a local `dnsproxy` daemon from a desktop controller.
//!
//! The daemon is an external process: it records its PID in a file, reads
//! `enable` / `disable` commands from a named pipe, and rewrites the system
//! DNS configuration. This crate answers "is it alive", sends it commands,
//! and gathers the network telemetry shown next to the toggle (system DNS
//! servers, active interface, latency to a public resolver), degrading field
//! by field when a probe fails.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use dnsproxy_controller::{
//!     ControllerConfig, DaemonCommand, DaemonSupervisor, StatusAggregator, SystemRunner,
//!     TelemetryCollector,
//! };
//! use std::sync::Arc;
//!
//! let config = ControllerConfig::new();
//! let supervisor = Arc::new(DaemonSupervisor::new(&config, SystemRunner::from_config(&config)));
//! let collector = Arc::new(TelemetryCollector::new(&config, SystemRunner::from_config(&config)));
//!
//! // One-off queries.
//! if !supervisor.is_running().await {
//!     supervisor.send_command(DaemonCommand::Enable)?;
//! }
//!
//! // Background polling.
//! let status = StatusAggregator::spawn(supervisor, collector, &config);
//! let snapshot = status.snapshot();
//! ```
//!
//! ## Probes
//!
//! Every external utility is a hard-coded absolute path from the [`Tool`]
//! allow-list, run with a fixed argument list, a cleared environment and a
//! bounded wait. Verify the inputs by hand with:
//!
//! ```bash
//! scutil --dns
//! route -n get default
//! networksetup -listallhardwareports
//! ps -o etime=,rss= -p "$(cat /tmp/dnsproxy.pid)"
//! ```
//!
//! ## Failure model
//!
//! Liveness is fail-closed: any error reading the PID file or listing the
//! process reads as "not running". Command sends return a typed
//! [`DaemonError`]. Telemetry never errors; undetermined fields carry a
//! sentinel and an advisory reason from the activity log.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod aggregator;
pub mod channel;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod history;
pub mod log_file;
pub mod parse;
pub mod pid_file;
pub mod probe;
pub mod supervisor;
pub mod telemetry;
pub mod util;

pub use aggregator::{StatusAggregator, StatusEvent, StatusHandle, StatusSnapshot};
pub use channel::CommandChannel;
pub use command::{DaemonCommand, is_valid_command};
pub use config::ControllerConfig;
pub use diagnostics::{Diagnostics, DiagnosticsReport};
pub use error::{DaemonError, ProbeError, Result};
pub use history::LatencyHistory;
pub use log_file::ActivityLog;
pub use pid_file::PidFile;
pub use probe::{CommandRunner, ProbeOutput, SystemRunner, Tool};
pub use supervisor::{DaemonState, DaemonSupervisor};
pub use telemetry::{ActiveInterface, Connectivity, DnsServers, TelemetryCollector, TelemetrySample};
