//! Commands accepted by the daemon.

use crate::error::DaemonError;
use std::fmt;
use std::str::FromStr;

/// A command the daemon understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaemonCommand {
    /// Route system DNS through the proxy.
    Enable,
    /// Restore the previous system DNS.
    Disable,
}

impl DaemonCommand {
    /// Every command, i.e. the whitelist.
    pub const ALL: [Self; 2] = [Self::Enable, Self::Disable];

    /// The token written to the command pipe.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }
}

impl fmt::Display for DaemonCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DaemonCommand {
    type Err = DaemonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.as_str() == s)
            .ok_or_else(|| DaemonError::InvalidCommand(s.to_string()))
    }
}

/// Returns `true` iff `token` is exactly `"enable"` or `"disable"`.
///
/// ```
/// use dnsproxy_controller::is_valid_command;
///
/// assert!(is_valid_command("enable"));
/// assert!(!is_valid_command("Enable"));
/// assert!(!is_valid_command(""));
/// ```
#[must_use]
pub fn is_valid_command(token: &str) -> bool {
    token.parse::<DaemonCommand>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist() {
        assert!(is_valid_command("enable"));
        assert!(is_valid_command("disable"));

        for token in ["", "invalid", "start", "stop", "ENABLE", "Disable", "enable\n", " enable"] {
            assert!(!is_valid_command(token), "{token:?} should be rejected");
        }
    }

    #[test]
    fn tokens_round_trip() {
        assert_eq!(DaemonCommand::ALL.len(), 2);
        for cmd in DaemonCommand::ALL {
            assert_eq!(cmd.as_str().parse::<DaemonCommand>().unwrap(), cmd);
            assert_eq!(cmd.to_string(), cmd.as_str());
        }
    }

    #[test]
    fn parse_error_carries_token() {
        let err = "restart".parse::<DaemonCommand>().unwrap_err();
        assert!(matches!(err, DaemonError::InvalidCommand(t) if t == "restart"));
    }
}
