//! On-disk configuration file

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::duration_human;

/// Contents of `config.toml`
///
/// Every field is optional; values given on the command line take
/// precedence over anything read here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    /// Relay server address
    pub server: Option<String>,

    /// Opaque relay credential (`user:pass`)
    pub auth: Option<String>,

    /// HTTP CONNECT proxy URL
    pub proxy: Option<String>,

    /// Host identifier: a path to a file holding it, or a UUID
    pub host_id: Option<String>,

    /// Delay between tunnel attempts
    #[serde(with = "duration_human::option", skip_serializing_if = "Option::is_none")]
    pub retry: Option<Duration>,

    /// Serve or use SFTP instead of an interactive shell
    pub sftp: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let file: ConfigFile = toml::from_str(
            r#"
            server = "relay.example.com:22"
            auth = "user:pass"
            proxy = "http://proxy:3128"
            host_id = "/etc/burrow/id"
            retry = "10s"
            sftp = true
            "#,
        )
        .unwrap();

        assert_eq!(file.server.as_deref(), Some("relay.example.com:22"));
        assert_eq!(file.auth.as_deref(), Some("user:pass"));
        assert_eq!(file.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(file.host_id.as_deref(), Some("/etc/burrow/id"));
        assert_eq!(file.retry, Some(Duration::from_secs(10)));
        assert_eq!(file.sftp, Some(true));
    }

    #[test]
    fn test_parse_empty_file() {
        let file: ConfigFile = toml::from_str("").unwrap();
        assert_eq!(file, ConfigFile::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<ConfigFile>("servre = \"x\"").is_err());
    }
}
