//! Network telemetry: DNS servers, active interface, resolver latency.
//!
//! Nothing in this module returns an error. Each metric walks its own
//! fallback chain and ends in a sentinel variant when every step fails; the
//! failure is written to the activity log, and the latest matching log line
//! is attached to the sample as an advisory reason.

use crate::config::ControllerConfig;
use crate::log_file::ActivityLog;
use crate::parse;
use crate::probe::{CommandRunner, Tool};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

const DNS_LOG_TAG: &str = "dns:";
const INTERFACE_LOG_TAG: &str = "interface:";
const LATENCY_LOG_TAG: &str = "latency:";

/// Resolvers in use by the system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsServers {
    /// Servers in discovery order, without duplicates.
    Found(Vec<String>),
    /// No step of the fallback chain produced a server.
    Undetermined,
}

impl DnsServers {
    /// Returns `true` for [`DnsServers::Undetermined`].
    #[must_use]
    pub const fn is_undetermined(&self) -> bool {
        matches!(self, Self::Undetermined)
    }
}

impl fmt::Display for DnsServers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(servers) => f.write_str(&servers.join(", ")),
            Self::Undetermined => f.write_str("Undetermined"),
        }
    }
}

/// Interface carrying the default route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveInterface {
    /// Device matched to a hardware port, shown as `"Wi-Fi (en0)"`.
    Port {
        /// Hardware port name.
        name: String,
        /// BSD device name.
        device: String,
    },
    /// Device without a matching hardware port (e.g. `utun3`).
    Device(String),
    /// No default route.
    Unknown,
}

impl ActiveInterface {
    /// Returns `true` for [`ActiveInterface::Unknown`].
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for ActiveInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Port { name, device } => write!(f, "{name} ({device})"),
            Self::Device(device) => f.write_str(device),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Result of the UDP connectivity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Connectivity {
    /// Whether the association became ready before the timeout.
    pub connected: bool,
    /// Time to readiness in whole milliseconds, when connected.
    pub latency_ms: Option<u64>,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.connected, self.latency_ms) {
            (true, Some(ms)) => write!(f, "{ms} ms"),
            _ => f.write_str("No connection"),
        }
    }
}

/// Advisory failure reasons, one per degraded field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReasons {
    /// Why the DNS servers are undetermined.
    pub dns_servers: Option<String>,
    /// Why the interface is unknown.
    pub active_interface: Option<String>,
    /// Why the connectivity probe failed.
    pub connectivity: Option<String>,
}

/// One telemetry tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetrySample {
    /// System DNS servers.
    pub dns_servers: DnsServers,
    /// Active network interface.
    pub active_interface: ActiveInterface,
    /// Remote resolver reachability.
    pub connectivity: Connectivity,
    /// Reasons for degraded fields.
    pub reasons: FieldReasons,
}

/// Gathers network telemetry through external utilities.
pub struct TelemetryCollector<R> {
    runner: R,
    log: ActivityLog,
    latency_host: String,
    latency_port: u16,
    latency_timeout: Duration,
}

impl<R: CommandRunner> TelemetryCollector<R> {
    /// Creates a collector using the paths and probe target in `config`.
    #[must_use]
    pub fn new(config: &ControllerConfig, runner: R) -> Self {
        Self {
            runner,
            log: ActivityLog::new(&config.log_file),
            latency_host: config.latency_host.clone(),
            latency_port: config.latency_port,
            latency_timeout: config.latency_timeout,
        }
    }

    /// The utility runner.
    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Collects all metrics concurrently and annotates degraded ones.
    pub async fn collect(&self) -> TelemetrySample {
        let (dns_servers, active_interface, connectivity) = tokio::join!(
            self.dns_servers(),
            self.active_interface(),
            self.check_connectivity()
        );

        let reasons = FieldReasons {
            dns_servers: dns_servers
                .is_undetermined()
                .then(|| self.log.last_matching(&[DNS_LOG_TAG]))
                .flatten(),
            active_interface: active_interface
                .is_unknown()
                .then(|| self.log.last_matching(&[INTERFACE_LOG_TAG]))
                .flatten(),
            connectivity: (!connectivity.connected)
                .then(|| self.log.last_matching(&[LATENCY_LOG_TAG]))
                .flatten(),
        };

        TelemetrySample {
            dns_servers,
            active_interface,
            connectivity,
            reasons,
        }
    }

    /// System DNS servers.
    ///
    /// 1. `scutil --dns` nameserver entries.
    /// 2. The first non-loopback server explicitly configured on any network
    ///    service.
    /// 3. [`DnsServers::Undetermined`].
    pub async fn dns_servers(&self) -> DnsServers {
        match self.runner.run(Tool::Scutil, &["--dns"]).await {
            Ok(out) => {
                let servers = parse::nameservers(&out.stdout);
                if !servers.is_empty() {
                    return DnsServers::Found(servers);
                }
                tracing::debug!("scutil reported no nameservers");
            }
            Err(e) => self.note(DNS_LOG_TAG, &format!("scutil --dns failed: {e}")),
        }

        if let Some(server) = self.configured_dns_server().await {
            return DnsServers::Found(vec![server]);
        }

        self.note(DNS_LOG_TAG, "could not determine DNS servers");
        DnsServers::Undetermined
    }

    async fn configured_dns_server(&self) -> Option<String> {
        let services = match self
            .runner
            .run(Tool::NetworkSetup, &["-listallnetworkservices"])
            .await
        {
            Ok(out) => parse::network_services(&out.stdout),
            Err(e) => {
                self.note(DNS_LOG_TAG, &format!("listing network services failed: {e}"));
                return None;
            }
        };

        for service in &services {
            match self
                .runner
                .run(Tool::NetworkSetup, &["-getdnsservers", service])
                .await
            {
                Ok(out) => {
                    if let Some(server) = parse::configured_dns_server(&out.stdout) {
                        return Some(server);
                    }
                }
                Err(e) => tracing::debug!(service = %service, error = %e, "getdnsservers failed"),
            }
        }
        None
    }

    /// Interface of the default route, labelled with its hardware port.
    pub async fn active_interface(&self) -> ActiveInterface {
        let device = match self.runner.run(Tool::Route, &["-n", "get", "default"]).await {
            Ok(out) => parse::default_route_interface(&out.stdout),
            Err(e) => {
                self.note(INTERFACE_LOG_TAG, &format!("route lookup failed: {e}"));
                return ActiveInterface::Unknown;
            }
        };
        let Some(device) = device else {
            self.note(INTERFACE_LOG_TAG, "no default route");
            return ActiveInterface::Unknown;
        };

        match self
            .runner
            .run(Tool::NetworkSetup, &["-listallhardwareports"])
            .await
        {
            Ok(out) => match parse::hardware_port_for(&out.stdout, &device) {
                Some(name) => ActiveInterface::Port { name, device },
                None => ActiveInterface::Device(device),
            },
            Err(e) => {
                tracing::debug!(device = %device, error = %e, "Hardware port lookup failed");
                ActiveInterface::Device(device)
            }
        }
    }

    /// Opens a UDP association to the configured resolver and times it.
    ///
    /// Gives up after the configured timeout (3 s by default) and reports
    /// "not connected".
    pub async fn check_connectivity(&self) -> Connectivity {
        let started = Instant::now();
        let attempt = associate(&self.latency_host, self.latency_port);

        match tokio::time::timeout(self.latency_timeout, attempt).await {
            Ok(Ok(())) => {
                let ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(host = %self.latency_host, latency_ms = ms, "Resolver reachable");
                Connectivity {
                    connected: true,
                    latency_ms: Some(ms),
                }
            }
            Ok(Err(e)) => {
                self.note(
                    LATENCY_LOG_TAG,
                    &format!("{} unreachable: {e}", self.latency_host),
                );
                Connectivity::default()
            }
            Err(_) => {
                self.note(
                    LATENCY_LOG_TAG,
                    &format!(
                        "{} timed out after {:?}",
                        self.latency_host, self.latency_timeout
                    ),
                );
                Connectivity::default()
            }
        }
    }

    /// OS product version from `sw_vers`.
    pub async fn system_version(&self) -> Option<String> {
        let out = self
            .runner
            .run(Tool::SwVers, &["-productVersion"])
            .await
            .ok()?;
        let version = out.stdout.trim();
        (out.success && !version.is_empty()).then(|| version.to_string())
    }

    fn note(&self, tag: &str, message: &str) {
        tracing::warn!(metric = tag.trim_end_matches(':'), "{message}");
        self.log.append(&format!("{tag} {message}"));
    }
}

async fn associate(host: &str, port: u16) -> io::Result<()> {
    let addr = tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host has no addresses"))?;
    let local: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await?;
    socket.connect(addr).await
}
