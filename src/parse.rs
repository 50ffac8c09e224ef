//! Parsers for the text output of the probed utilities.
//!
//! All functions are pure; they take the captured stdout and never fail,
//! returning `None` or an empty list when nothing useful is found.

use regex::Regex;
use std::sync::LazyLock;

/// `nameserver[0] : 8.8.8.8` as printed by `scutil --dns`.
static NAMESERVER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*nameserver\[\d+\]\s*:\s*(\S+)\s*$").expect("static regex is valid")
});

/// Loopback; reported by `networksetup` when the daemon has taken over DNS.
const LOOPBACK: &str = "127.0.0.1";

/// Prefix of the `networksetup -getdnsservers` "nothing configured" message.
const NO_DNS_SERVERS_MARKER: &str = "There aren't any DNS Servers set";

/// Legend printed before the service list by `-listallnetworkservices`.
const SERVICE_LEGEND_MARKER: &str = "An asterisk";

/// Extracts nameservers from `scutil --dns`, deduplicated in discovery order.
///
/// ```
/// use dnsproxy_controller::parse::nameservers;
///
/// let out = "resolver #1\n  nameserver[0] : 8.8.8.8\n  nameserver[1] : 8.8.8.8\n";
/// assert_eq!(nameservers(out), vec!["8.8.8.8"]);
/// ```
#[must_use]
pub fn nameservers(output: &str) -> Vec<String> {
    let mut servers: Vec<String> = Vec::new();
    for line in output.lines() {
        if let Some(caps) = NAMESERVER_LINE.captures(line) {
            let server = &caps[1];
            if !servers.iter().any(|s| s == server) {
                servers.push(server.to_string());
            }
        }
    }
    servers
}

/// First informative server from `networksetup -getdnsservers <service>`.
///
/// Skips loopback (the daemon's own override) and the "no servers" marker.
#[must_use]
pub fn configured_dns_server(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| {
            !line.is_empty() && *line != LOOPBACK && !line.contains(NO_DNS_SERVERS_MARKER)
        })
        .map(str::to_string)
}

/// Service names from `networksetup -listallnetworkservices`.
///
/// Disabled services are listed with a leading `*`; the name is returned
/// without it.
#[must_use]
pub fn network_services(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(SERVICE_LEGEND_MARKER))
        .map(|line| line.trim_start_matches('*').trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Device of the default route from `route -n get default`.
#[must_use]
pub fn default_route_interface(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let value = line.trim().strip_prefix("interface:")?.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Hardware port name for `device` from `networksetup -listallhardwareports`.
///
/// The output is a series of blank-line separated blocks:
///
/// ```text
/// Hardware Port: Wi-Fi
/// Device: en0
/// Ethernet Address: aa:bb:cc:dd:ee:ff
/// ```
#[must_use]
pub fn hardware_port_for(output: &str, device: &str) -> Option<String> {
    let mut port: Option<&str> = None;
    for line in output.lines().map(str::trim) {
        if line.is_empty() {
            port = None;
        } else if let Some(name) = line.strip_prefix("Hardware Port:") {
            port = Some(name.trim());
        } else if let Some(dev) = line.strip_prefix("Device:") {
            if dev.trim() == device {
                if let Some(name) = port.filter(|n| !n.is_empty()) {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

/// Elapsed time from `ps -o etime= -p <pid>`, unmodified apart from trimming.
#[must_use]
pub fn elapsed_time(output: &str) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Resident set size from `ps -o rss= -p <pid>` (KB), rendered as `"x.y MB"`.
///
/// ```
/// use dnsproxy_controller::parse::rss_megabytes;
///
/// assert_eq!(rss_megabytes(" 20480\n").as_deref(), Some("20.0 MB"));
/// assert_eq!(rss_megabytes(""), None);
/// ```
#[must_use]
pub fn rss_megabytes(output: &str) -> Option<String> {
    let kb: u64 = output.trim().parse().ok()?;
    #[allow(clippy::cast_precision_loss)]
    let mb = kb as f64 / 1024.0;
    Some(format!("{mb:.1} MB"))
}

/// Whether a `ps -p <pid>` listing mentions `marker`.
#[must_use]
pub fn listing_contains(output: &str, marker: &str) -> bool {
    output.contains(marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCUTIL_DNS: &str = "\
DNS configuration

resolver #1
  nameserver[0] : 127.0.0.1
  nameserver[1] : 1.1.1.1
  if_index : 6 (en0)
  flags    : Request A records
  reach    : 0x00030002 (Reachable,Local Address,Directly Reachable Address)

resolver #2
  domain   : local
  options  : mdns
  nameserver[0] : 1.1.1.1

DNS configuration (for scoped queries)

resolver #1
  nameserver[0] : 192.168.1.1
";

    #[test]
    fn nameservers_dedup_in_discovery_order() {
        assert_eq!(
            nameservers(SCUTIL_DNS),
            vec!["127.0.0.1", "1.1.1.1", "192.168.1.1"]
        );
    }

    #[test]
    fn nameservers_duplicate_pair_collapses() {
        let out = "nameserver[0]: 8.8.8.8\nnameserver[1]: 8.8.8.8\n";
        assert_eq!(nameservers(out), vec!["8.8.8.8"]);
    }

    #[test]
    fn nameservers_ignore_other_lines() {
        assert!(nameservers("No DNS configuration available\n").is_empty());
        assert!(nameservers("").is_empty());
    }

    #[test]
    fn nameservers_accept_ipv6() {
        let out = "  nameserver[0] : fe80::1%en0\n";
        assert_eq!(nameservers(out), vec!["fe80::1%en0"]);
    }

    #[test]
    fn configured_server_skips_loopback_and_marker() {
        assert_eq!(
            configured_dns_server("127.0.0.1\n9.9.9.9\n8.8.8.8\n").as_deref(),
            Some("9.9.9.9")
        );
        assert_eq!(
            configured_dns_server("There aren't any DNS Servers set on Wi-Fi.\n"),
            None
        );
        assert_eq!(configured_dns_server("127.0.0.1\n"), None);
        assert_eq!(configured_dns_server("\n\n"), None);
    }

    #[test]
    fn services_drop_legend_and_asterisks() {
        let out = "An asterisk (*) denotes that a network service is disabled.\n\
                   Wi-Fi\n\
                   *Thunderbolt Bridge\n\
                   USB 10/100/1000 LAN\n\n";
        assert_eq!(
            network_services(out),
            vec!["Wi-Fi", "Thunderbolt Bridge", "USB 10/100/1000 LAN"]
        );
    }

    #[test]
    fn route_interface() {
        let out = "   route to: default\n\
                   destination: default\n\
                          mask: default\n\
                       gateway: 192.168.1.1\n\
                     interface: en0\n\
                         flags: <UP,GATEWAY,DONE,STATIC,PRCLONING>\n";
        assert_eq!(default_route_interface(out).as_deref(), Some("en0"));
        assert_eq!(default_route_interface("route: writing to routing socket: not in table\n"), None);
        assert_eq!(default_route_interface("interface:   \n"), None);
    }

    #[test]
    fn hardware_port_lookup() {
        let out = "\nHardware Port: Ethernet\nDevice: en1\nEthernet Address: 00:11:22:33:44:55\n\n\
                   Hardware Port: Wi-Fi\nDevice: en0\nEthernet Address: aa:bb:cc:dd:ee:ff\n\n\
                   VLAN Configurations\n===================\n";
        assert_eq!(hardware_port_for(out, "en0").as_deref(), Some("Wi-Fi"));
        assert_eq!(hardware_port_for(out, "en1").as_deref(), Some("Ethernet"));
        assert_eq!(hardware_port_for(out, "en10"), None);
        assert_eq!(hardware_port_for(out, "utun3"), None);
    }

    #[test]
    fn elapsed_time_is_trimmed_only() {
        assert_eq!(elapsed_time("   01:02:03\n").as_deref(), Some("01:02:03"));
        assert_eq!(elapsed_time("2-04:05:06").as_deref(), Some("2-04:05:06"));
        assert_eq!(elapsed_time(" \n"), None);
    }

    #[test]
    fn rss_conversion() {
        assert_eq!(rss_megabytes("20480").as_deref(), Some("20.0 MB"));
        assert_eq!(rss_megabytes("  1536\n").as_deref(), Some("1.5 MB"));
        assert_eq!(rss_megabytes("0").as_deref(), Some("0.0 MB"));
        assert_eq!(rss_megabytes("n/a"), None);
    }

    #[test]
    fn listing_marker() {
        let out = "  PID TTY           TIME CMD\n 1234 ??         0:01.02 /opt/homebrew/bin/dnsproxy --config x\n";
        assert!(listing_contains(out, "dnsproxy"));
        assert!(!listing_contains("  PID TTY           TIME CMD\n", "dnsproxy"));
    }
}
