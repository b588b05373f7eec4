//! Terminal session: connection target, login and the pending challenge.
//!
//! `Disconnected -> Connected(host)` on CONNECT, back on DISCONNECT. Login is
//! layered on top of a connection and dropped together with it. Nothing here
//! is persisted.

use crate::core::error::ShellError;
use crate::core::world;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostAddress([u8; 4]);

impl HostAddress {
    pub const fn new(a: u8, b: u8, c: u8, d: u8) -> Self {
        HostAddress([a, b, c, d])
    }
}

impl FromStr for HostAddress {
    type Err = ShellError;

    /// Four dot-separated decimal integers, each in `0..=255`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ShellError::SyntaxRejected(format!("Invalid IP address: {s}"));
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 4 {
            return Err(invalid());
        }
        let mut octets = [0u8; 4];
        for (slot, part) in octets.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse::<u8>().map_err(|_| invalid())?;
        }
        Ok(HostAddress(octets))
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a}.{b}.{c}.{d}")
    }
}

/// Which credential check resolves a deferred command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeKind {
    Firewall,
    PcAccess,
    Router,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Firewall => "firewall",
            ChallengeKind::PcAccess => "pc_access",
            ChallengeKind::Router => "router",
        }
    }

    /// What the player is asked for.
    pub fn prompt(&self) -> &'static str {
        match self {
            ChallengeKind::Firewall => "Firewall password required",
            ChallengeKind::PcAccess => "User password required",
            ChallengeKind::Router => "Router password required",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    pub text: String,
    pub challenge: ChallengeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub connected_host: Option<HostAddress>,
    pub logged_in_identity: Option<String>,
    pub permission_level: u8,
    pub pending_command: Option<PendingCommand>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected_host.is_some()
    }

    pub fn is_connected_to(&self, host: HostAddress) -> bool {
        self.connected_host == Some(host)
    }

    pub fn connect(&mut self, host: HostAddress) {
        self.connected_host = Some(host);
    }

    /// Drops the connection and any login layered on it.
    pub fn disconnect(&mut self) {
        self.connected_host = None;
        self.logged_in_identity = None;
        self.permission_level = 0;
    }

    pub fn login(&mut self, name: &str, permission_level: u8) {
        self.logged_in_identity = Some(name.to_string());
        self.permission_level = permission_level;
    }

    pub fn defer(&mut self, pending: PendingCommand) {
        self.pending_command = Some(pending);
    }

    pub fn take_pending(&mut self) -> Option<PendingCommand> {
        self.pending_command.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending_command.is_some()
    }
}

/// Permission needed to open a connection to `host`. Unlisted hosts need none.
pub fn required_permission(host: HostAddress) -> u8 {
    world::PRIVILEGED_HOSTS
        .iter()
        .find(|p| p.host == host)
        .map(|p| p.level)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_address_accepts_dotted_quads() {
        let host: HostAddress = "174.156.12.4".parse().unwrap();
        assert_eq!(host, HostAddress::new(174, 156, 12, 4));
        assert_eq!(host.to_string(), "174.156.12.4");
        assert!("0.0.0.0".parse::<HostAddress>().is_ok());
        assert!("255.255.255.255".parse::<HostAddress>().is_ok());
    }

    #[test]
    fn host_address_rejects_malformed_input() {
        for bad in [
            "256.1.1.1",
            "1.2.3",
            "1.2.3.4.5",
            "a.b.c.d",
            "1..2.3",
            "+1.2.3.4",
            "1.2.3.0004",
            "",
        ] {
            let err = bad.parse::<HostAddress>().unwrap_err();
            assert!(matches!(err, ShellError::SyntaxRejected(_)), "{bad}");
        }
    }

    #[test]
    fn disconnect_drops_login() {
        let mut session = Session::new();
        session.connect(HostAddress::new(10, 0, 0, 1));
        session.login("itexpert", 2);
        assert!(session.is_connected());

        session.disconnect();
        assert_eq!(session, Session::default());
    }

    #[test]
    fn pending_command_is_taken_once() {
        let mut session = Session::new();
        session.defer(PendingCommand {
            text: "UPDATE Firewall SET status = 'inactive' WHERE level = 1".into(),
            challenge: ChallengeKind::Firewall,
        });
        assert!(session.has_pending());
        assert!(session.take_pending().is_some());
        assert!(session.take_pending().is_none());
    }

    #[test]
    fn privileged_hosts_need_permission() {
        assert_eq!(required_permission(HostAddress::new(174, 156, 12, 1)), 2);
        assert_eq!(required_permission(world::MAIN_HOST), 0);
    }
}
