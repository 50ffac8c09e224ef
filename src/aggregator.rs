//! Periodic polling and snapshot publication.
//!
//! Two independent tasks run on the tokio runtime: a liveness loop
//! (default every 3 s) and a telemetry loop (every 5 s). Each one owns its
//! slice of the [`StatusSnapshot`] and publishes it through a `watch`
//! channel, so a slow probe in one loop never delays the other. Liveness and
//! connectivity transitions are additionally announced as [`StatusEvent`]s.

use crate::config::ControllerConfig;
use crate::history::LatencyHistory;
use crate::probe::CommandRunner;
use crate::supervisor::{DaemonState, DaemonSupervisor};
use crate::telemetry::{TelemetryCollector, TelemetrySample};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

const CONNECTIVITY_UNKNOWN: u8 = 0;
const CONNECTIVITY_DOWN: u8 = 1;
const CONNECTIVITY_UP: u8 = 2;

/// Consolidated, UI-ready status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Latest daemon state.
    pub daemon: DaemonState,
    /// `daemon.is_running()`, kept alongside for readers that only need the toggle.
    pub running: bool,
    /// Latest telemetry, `None` until the first telemetry tick completes.
    pub telemetry: Option<TelemetrySample>,
    /// Last ten latency samples, oldest first.
    pub latency_history: LatencyHistory,
    /// When `daemon` was computed.
    pub daemon_checked_at: Option<DateTime<Local>>,
    /// When `telemetry` was computed.
    pub telemetry_checked_at: Option<DateTime<Local>>,
}

impl StatusSnapshot {
    /// Whether protection is active as of the latest liveness tick.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.running
    }
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            daemon: DaemonState::Unknown("not checked yet".to_string()),
            running: false,
            telemetry: None,
            latency_history: LatencyHistory::new(),
            daemon_checked_at: None,
            telemetry_checked_at: None,
        }
    }
}

/// One-shot transition notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The daemon started or stopped.
    DaemonStateChanged {
        /// New liveness.
        running: bool,
    },
    /// The remote resolver became reachable or unreachable.
    ConnectivityChanged {
        /// New reachability.
        connected: bool,
    },
}

/// Spawns the polling loops.
pub struct StatusAggregator;

impl StatusAggregator {
    /// Starts both loops on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn<S, T>(
        supervisor: Arc<DaemonSupervisor<S>>,
        collector: Arc<TelemetryCollector<T>>,
        config: &ControllerConfig,
    ) -> StatusHandle
    where
        S: CommandRunner + 'static,
        T: CommandRunner + 'static,
    {
        let (snapshot_tx, snapshot_rx) = watch::channel(StatusSnapshot::default());
        let snapshot_tx = Arc::new(snapshot_tx);
        let (events_tx, _) = broadcast::channel(16);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let connectivity = Arc::new(AtomicU8::new(CONNECTIVITY_UNKNOWN));

        let liveness = tokio::spawn(liveness_task(
            supervisor,
            config.status_interval,
            Arc::clone(&snapshot_tx),
            events_tx.clone(),
            shutdown_tx.subscribe(),
        ));
        let telemetry = tokio::spawn(telemetry_task(
            collector,
            config.telemetry_interval,
            snapshot_tx,
            events_tx.clone(),
            Arc::clone(&connectivity),
            shutdown_tx.subscribe(),
        ));

        tracing::info!(
            status_interval = ?config.status_interval,
            telemetry_interval = ?config.telemetry_interval,
            "Status monitoring started"
        );

        StatusHandle {
            snapshot_rx,
            events_tx,
            shutdown_tx,
            connectivity,
            tasks: vec![liveness, telemetry],
        }
    }
}

/// Handle to the running loops.
pub struct StatusHandle {
    snapshot_rx: watch::Receiver<StatusSnapshot>,
    events_tx: broadcast::Sender<StatusEvent>,
    shutdown_tx: broadcast::Sender<()>,
    connectivity: Arc<AtomicU8>,
    tasks: Vec<JoinHandle<()>>,
}

impl StatusHandle {
    /// Copy of the latest snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe_snapshots(&self) -> watch::Receiver<StatusSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Receiver for transition events from now on.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<StatusEvent> {
        self.events_tx.subscribe()
    }

    /// Last connectivity result, `None` before the first telemetry tick.
    #[must_use]
    pub fn last_connectivity(&self) -> Option<bool> {
        match self.connectivity.load(Ordering::Acquire) {
            CONNECTIVITY_UP => Some(true),
            CONNECTIVITY_DOWN => Some(false),
            _ => None,
        }
    }

    /// Stops both loops, letting an in-flight tick finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Status task ended abnormally");
            }
        }
        tracing::info!("Status monitoring stopped");
    }
}

const fn connectivity_state(connected: bool) -> u8 {
    if connected { CONNECTIVITY_UP } else { CONNECTIVITY_DOWN }
}

/// Event for moving from the `previous` connectivity state to `connected`.
/// The first observation only sets the baseline.
fn connectivity_event(previous: u8, connected: bool) -> Option<StatusEvent> {
    (previous != CONNECTIVITY_UNKNOWN && previous != connectivity_state(connected))
        .then_some(StatusEvent::ConnectivityChanged { connected })
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn liveness_task<R: CommandRunner>(
    supervisor: Arc<DaemonSupervisor<R>>,
    period: Duration,
    snapshot_tx: Arc<watch::Sender<StatusSnapshot>>,
    events_tx: broadcast::Sender<StatusEvent>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = ticker(period);
    let mut last_running: Option<bool> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let state = supervisor.daemon_state().await;
                let running = state.is_running();

                if last_running.is_some_and(|prev| prev != running) {
                    tracing::info!(running, "Daemon state changed");
                    // No subscribers is fine.
                    let _ = events_tx.send(StatusEvent::DaemonStateChanged { running });
                }
                last_running = Some(running);

                snapshot_tx.send_modify(|snapshot| {
                    snapshot.daemon = state;
                    snapshot.running = running;
                    snapshot.daemon_checked_at = Some(Local::now());
                });
            }
            _ = shutdown.recv() => break,
        }
    }
}

async fn telemetry_task<R: CommandRunner>(
    collector: Arc<TelemetryCollector<R>>,
    period: Duration,
    snapshot_tx: Arc<watch::Sender<StatusSnapshot>>,
    events_tx: broadcast::Sender<StatusEvent>,
    connectivity: Arc<AtomicU8>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = ticker(period);
    let mut history = LatencyHistory::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let sample = collector.collect().await;
                let connected = sample.connectivity.connected;
                history.record(sample.connectivity.latency_ms);

                let previous = connectivity.swap(connectivity_state(connected), Ordering::AcqRel);
                if let Some(event) = connectivity_event(previous, connected) {
                    if connected {
                        tracing::info!("Connection restored");
                    } else {
                        tracing::warn!("Connection lost");
                    }
                    let _ = events_tx.send(event);
                }

                let history = history.clone();
                snapshot_tx.send_modify(|snapshot| {
                    snapshot.telemetry = Some(sample);
                    snapshot.latency_history = history;
                    snapshot.telemetry_checked_at = Some(Local::now());
                });
            }
            _ = shutdown.recv() => break,
        }
    }
}
