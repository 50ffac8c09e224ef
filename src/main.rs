//! `dnsctl`: command-line front end for the dnsproxy controller.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dnsproxy_controller::{
    ActivityLog, ControllerConfig, DaemonCommand, DaemonSupervisor, Diagnostics, StatusAggregator,
    StatusEvent, StatusSnapshot, SystemRunner, TelemetryCollector,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dnsctl")]
#[command(about = "Control and inspect the local dnsproxy daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// PID file written by the daemon
    #[arg(long, global = true)]
    pid_file: Option<PathBuf>,

    /// Command pipe read by the daemon
    #[arg(long, global = true)]
    pipe: Option<PathBuf>,

    /// Activity log file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Liveness poll interval in seconds
    #[arg(long, global = true)]
    status_interval: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon state and network telemetry
    Status,

    /// Turn DNS protection on
    Enable,

    /// Turn DNS protection off
    Disable,

    /// Run the diagnostics checks
    Diagnostics,

    /// Poll continuously and print state changes
    Watch {
        /// Stop after this many telemetry updates
        #[arg(long)]
        ticks: Option<usize>,
    },

    /// Print the activity log
    Log,
}

impl Cli {
    fn config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = ControllerConfig::new();
        if let Some(path) = &self.pid_file {
            config = config.with_pid_file(path);
        }
        if let Some(path) = &self.pipe {
            config = config.with_command_pipe(path);
        }
        if let Some(path) = &self.log_file {
            config = config.with_log_file(path);
        }
        if let Some(secs) = self.status_interval {
            config = config.with_status_interval(Duration::from_secs(secs));
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let supervisor = DaemonSupervisor::new(&config, SystemRunner::from_config(&config));
    let collector = TelemetryCollector::new(&config, SystemRunner::from_config(&config));

    match cli.command {
        Commands::Status => {
            let (state, sample) = tokio::join!(supervisor.daemon_state(), collector.collect());
            println!("Daemon:     {state}");
            println!("DNS:        {}", sample.dns_servers);
            println!("Interface:  {}", sample.active_interface);
            println!("Latency:    {}", sample.connectivity);
            for reason in [
                &sample.reasons.dns_servers,
                &sample.reasons.active_interface,
                &sample.reasons.connectivity,
            ]
            .into_iter()
            .flatten()
            {
                println!("  note: {reason}");
            }
        }
        Commands::Enable => send(&supervisor, DaemonCommand::Enable)?,
        Commands::Disable => send(&supervisor, DaemonCommand::Disable)?,
        Commands::Diagnostics => {
            let report = Diagnostics::new(&config, &supervisor, &collector).run().await;
            println!("{report}");
        }
        Commands::Watch { ticks } => watch(supervisor, collector, &config, ticks).await?,
        Commands::Log => match ActivityLog::new(&config.log_file).read_all() {
            Some(content) => print!("{content}"),
            None => println!("Log file not found: {}", config.log_file.display()),
        },
    }

    Ok(())
}

fn send(supervisor: &DaemonSupervisor<SystemRunner>, command: DaemonCommand) -> anyhow::Result<()> {
    if let Err(e) = supervisor.send_command(command) {
        eprintln!("hint: {}", e.recovery_suggestion());
        bail!(e);
    }
    println!("Sent `{command}`");
    Ok(())
}

async fn watch(
    supervisor: DaemonSupervisor<SystemRunner>,
    collector: TelemetryCollector<SystemRunner>,
    config: &ControllerConfig,
    ticks: Option<usize>,
) -> anyhow::Result<()> {
    let status = StatusAggregator::spawn(Arc::new(supervisor), Arc::new(collector), config);
    let mut snapshots = status.subscribe_snapshots();
    let mut events = status.subscribe_events();
    let mut seen = 0usize;
    let mut last_telemetry = None;

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if snapshot.telemetry_checked_at.is_some()
                    && snapshot.telemetry_checked_at != last_telemetry
                {
                    last_telemetry = snapshot.telemetry_checked_at;
                    seen += 1;
                }
                print_line(&snapshot);
                if ticks.is_some_and(|max| seen >= max) {
                    break;
                }
            }
            Ok(event) = events.recv() => match event {
                StatusEvent::DaemonStateChanged { running } => {
                    println!("* protection {}", if running { "started" } else { "stopped" });
                }
                StatusEvent::ConnectivityChanged { connected } => {
                    println!("* connection {}", if connected { "restored" } else { "lost" });
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    status.shutdown().await;
    Ok(())
}

fn print_line(snapshot: &StatusSnapshot) {
    let latency = snapshot
        .latency_history
        .values()
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    match &snapshot.telemetry {
        Some(t) => println!(
            "{} | dns {} | {} | {} | history [{latency}]",
            snapshot.daemon, t.dns_servers, t.active_interface, t.connectivity
        ),
        None => println!("{}", snapshot.daemon),
    }
}
