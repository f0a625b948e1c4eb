//! Core domain types

use std::fmt;
use std::str::FromStr;

use crate::error::TunnelError;

/// Terminal dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminalSize {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl TerminalSize {
    /// Create a new terminal size
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Build a size from the `u32` dimensions carried by SSH requests,
    /// clamping to the `u16` range and to at least one cell.
    pub fn from_ssh(cols: u32, rows: u32) -> Self {
        let clamp = |v: u32| v.clamp(1, u16::MAX as u32) as u16;
        Self {
            rows: clamp(rows),
            cols: clamp(cols),
        }
    }

    /// Default terminal size (24x80)
    pub fn default_size() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::default_size()
    }
}

/// One port mapping carried by the relay tunnel.
///
/// Renders as `[R:][local:]remote`. A reversed mapping asks the relay to
/// listen on `remote` and forward inbound traffic back to this side's
/// `127.0.0.1:remote`; a forward mapping listens on `local` here and sends
/// traffic to the relay's `127.0.0.1:remote`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TunnelRemote {
    /// Relay forwards inbound traffic back to us
    pub reversed: bool,
    /// Local listening port, `None` when the relay side decides
    pub local_port: Option<u16>,
    /// Port on the relay's loopback
    pub remote_port: u16,
}

impl TunnelRemote {
    /// Mapping used by the host side: relay listens on `port`, traffic
    /// comes back to the local session server on the same port.
    pub fn reverse(port: u16) -> Self {
        Self {
            reversed: true,
            local_port: None,
            remote_port: port,
        }
    }

    /// Mapping used by the connect side: `local` here forwards to `remote`
    /// on the relay.
    pub fn forward(local: u16, remote: u16) -> Self {
        Self {
            reversed: false,
            local_port: Some(local).filter(|p| *p > 0),
            remote_port: remote,
        }
    }

    /// Build a mapping from raw parts; a local port of 0 means unset.
    pub fn new(reversed: bool, local_port: u16, remote_port: u16) -> Self {
        Self {
            reversed,
            local_port: Some(local_port).filter(|p| *p > 0),
            remote_port,
        }
    }
}

impl fmt::Display for TunnelRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(3);
        if self.reversed {
            parts.push("R".to_string());
        }
        if let Some(local) = self.local_port {
            parts.push(local.to_string());
        }
        parts.push(self.remote_port.to_string());
        write!(f, "{}", parts.join(":"))
    }
}

impl FromStr for TunnelRemote {
    type Err = TunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts: Vec<&str> = s.split(':').collect();
        let reversed = parts.first() == Some(&"R");
        if reversed {
            parts.remove(0);
        }

        let parse = |p: &str| {
            p.parse::<u16>()
                .map_err(|_| TunnelError::InvalidRemote(s.to_string()))
        };

        match parts.as_slice() {
            [remote] => Ok(Self::new(reversed, 0, parse(remote)?)),
            [local, remote] => Ok(Self::new(reversed, parse(local)?, parse(remote)?)),
            _ => Err(TunnelError::InvalidRemote(s.to_string())),
        }
    }
}

/// Lifecycle of the tunnel supervisor as seen by observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelState {
    /// Supervisor created, no attempt yet
    Idle,
    /// A client is being started
    Connecting,
    /// The active client is up and forwarding
    Connected,
    /// The active client exited normally, a retry is pending
    Disconnected,
    /// The active client failed, a retry is pending unless creation failed
    Failed(String),
    /// Supervisor exited
    Stopped,
}

impl TunnelState {
    /// Whether the supervisor has exited for good
    pub fn is_terminal(&self) -> bool {
        matches!(self, TunnelState::Stopped)
    }
}

impl fmt::Display for TunnelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunnelState::Idle => write!(f, "idle"),
            TunnelState::Connecting => write!(f, "connecting"),
            TunnelState::Connected => write!(f, "connected"),
            TunnelState::Disconnected => write!(f, "disconnected"),
            TunnelState::Failed(reason) => write!(f, "failed: {}", reason),
            TunnelState::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_display_reversed() {
        assert_eq!(TunnelRemote::reverse(5000).to_string(), "R:5000");
        assert_eq!(TunnelRemote::new(true, 0, 5000).to_string(), "R:5000");
    }

    #[test]
    fn test_remote_display_forward() {
        assert_eq!(TunnelRemote::forward(40000, 5000).to_string(), "40000:5000");
        assert_eq!(TunnelRemote::new(false, 0, 5000).to_string(), "5000");
    }

    #[test]
    fn test_remote_parse() {
        let r: TunnelRemote = "R:5000".parse().unwrap();
        assert_eq!(r, TunnelRemote::reverse(5000));

        let f: TunnelRemote = "40000:5000".parse().unwrap();
        assert_eq!(f, TunnelRemote::forward(40000, 5000));

        let bare: TunnelRemote = "22".parse().unwrap();
        assert!(!bare.reversed);
        assert_eq!(bare.local_port, None);
        assert_eq!(bare.remote_port, 22);
    }

    #[test]
    fn test_remote_parse_invalid() {
        assert!("".parse::<TunnelRemote>().is_err());
        assert!("R:".parse::<TunnelRemote>().is_err());
        assert!("1:2:3".parse::<TunnelRemote>().is_err());
        assert!("R:70000".parse::<TunnelRemote>().is_err());
    }

    #[test]
    fn test_terminal_size_from_ssh_clamps() {
        assert_eq!(TerminalSize::from_ssh(0, 0), TerminalSize::new(1, 1));
        assert_eq!(TerminalSize::from_ssh(120, 40), TerminalSize::new(40, 120));
        assert_eq!(
            TerminalSize::from_ssh(u32::MAX, 10),
            TerminalSize::new(10, u16::MAX)
        );
    }

    #[test]
    fn test_tunnel_state_display() {
        assert_eq!(TunnelState::Connected.to_string(), "connected");
        assert_eq!(
            TunnelState::Failed("boom".into()).to_string(),
            "failed: boom"
        );
        assert!(TunnelState::Stopped.is_terminal());
        assert!(!TunnelState::Disconnected.is_terminal());
    }
}
