//! Relay server address parsing

use std::fmt;
use std::str::FromStr;

use url::{Host, Url};

use burrow_core::error::TunnelError;

/// Port used when the relay address doesn't name one
pub const DEFAULT_RELAY_PORT: u16 = 22;

/// URL schemes accepted in a relay address. The relay is always spoken to
/// over SSH; anything other than `ssh` only names where it listens.
const ACCEPTED_SCHEMES: &[&str] = &["ssh", "http", "https"];

/// Where the relay listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAddress {
    /// Host name or IP literal (without brackets)
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl FromStr for RelayAddress {
    type Err = TunnelError;

    /// Accepts `host`, `host:port`, `[v6]:port` or a URL with one of the
    /// accepted schemes. Paths and queries are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TunnelError::InvalidServer(s.to_string());
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let authority = match trimmed.split_once("://") {
            Some((scheme, rest)) => {
                let scheme = scheme.to_ascii_lowercase();
                if !ACCEPTED_SCHEMES.contains(&scheme.as_str()) {
                    return Err(invalid());
                }
                if scheme != "ssh" {
                    tracing::debug!("Ignoring scheme {:?} in relay address, dialing SSH", scheme);
                }
                rest
            }
            None => trimmed,
        };

        // Reparse under a non-special scheme so an explicit `:80` or `:443`
        // is kept rather than folded into the scheme default.
        let url = Url::parse(&format!("ssh://{}", authority)).map_err(|_| invalid())?;
        let host = match url.host().ok_or_else(invalid)? {
            Host::Domain(d) if !d.is_empty() => d.to_string(),
            Host::Domain(_) => return Err(invalid()),
            Host::Ipv4(ip) => ip.to_string(),
            Host::Ipv6(ip) => ip.to_string(),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_RELAY_PORT),
        })
    }
}

impl fmt::Display for RelayAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> RelayAddress {
        s.parse().unwrap()
    }

    #[test]
    fn test_host_only() {
        assert_eq!(
            parse("relay.example.com"),
            RelayAddress {
                host: "relay.example.com".into(),
                port: 22
            }
        );
    }

    #[test]
    fn test_host_port() {
        assert_eq!(parse("relay.example.com:2222").port, 2222);
        assert_eq!(parse("10.0.0.1:80").to_string(), "10.0.0.1:80");
    }

    #[test]
    fn test_url_forms() {
        assert_eq!(parse("ssh://relay:2022").to_string(), "relay:2022");
        assert_eq!(parse("http://relay:80/path").to_string(), "relay:80");
        assert_eq!(parse("https://relay").to_string(), "relay:22");
    }

    #[test]
    fn test_ipv6() {
        let addr = parse("[::1]:2222");
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:2222");
    }

    #[test]
    fn test_invalid() {
        assert!("".parse::<RelayAddress>().is_err());
        assert!("ftp://relay".parse::<RelayAddress>().is_err());
        assert!("wss://relay".parse::<RelayAddress>().is_err());
        assert!("ws://relay:8080".parse::<RelayAddress>().is_err());
        assert!("relay:notaport".parse::<RelayAddress>().is_err());
        assert!("relay:70000".parse::<RelayAddress>().is_err());
    }
}
