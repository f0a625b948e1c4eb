//! Configuration management for burrow

mod file;
pub mod serde_utils;

pub use file::ConfigFile;

use crate::error::ConfigError;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default delay between tunnel attempts
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(10);

/// Fully resolved runtime configuration
///
/// Built once by the CLI and cloned into each flow; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host identifier as given: a path to a file holding it, or a UUID
    pub host_id: String,
    /// HTTP CONNECT proxy URL
    pub proxy: Option<String>,
    /// Opaque relay credential
    pub auth: Option<String>,
    /// Delay between tunnel attempts, also the SSH dial timeout
    pub retry_period: Duration,
    /// Relay server address
    pub relay_server: String,
    /// Serve or use SFTP instead of an interactive shell
    pub enable_sftp: bool,
}

/// Values supplied on the command line; each one beats the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server: Option<String>,
    pub auth: Option<String>,
    pub proxy: Option<String>,
    pub host_id: Option<String>,
    pub retry: Option<Duration>,
    pub sftp: bool,
}

impl Config {
    /// Merge command-line values over an optional config file.
    ///
    /// A missing relay server is an error; a missing host id resolves to an
    /// empty string, which later fails identifier resolution.
    pub fn resolve(overrides: ConfigOverrides, file: Option<ConfigFile>) -> Result<Self, ConfigError> {
        let file = file.unwrap_or_default();

        let relay_server = overrides
            .server
            .or(file.server)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField("server".to_string()))?;

        let retry_period = overrides
            .retry
            .or(file.retry)
            .unwrap_or(DEFAULT_RETRY_PERIOD);
        if retry_period.is_zero() {
            return Err(ConfigError::Invalid("retry period must be positive".to_string()));
        }

        Ok(Self {
            host_id: overrides.host_id.or(file.host_id).unwrap_or_default(),
            proxy: overrides.proxy.or(file.proxy).filter(|s| !s.is_empty()),
            auth: overrides.auth.or(file.auth).filter(|s| !s.is_empty()),
            retry_period,
            relay_server,
            enable_sftp: overrides.sftp || file.sftp.unwrap_or(false),
        })
    }
}

/// Get the default configuration directory
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("burrow")
}

/// Get the default configuration file path
pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.toml")
}

/// Load configuration from a file
pub fn load_config<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read config: {}", e)))?;

    let config: T = toml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn overrides(server: &str) -> ConfigOverrides {
        ConfigOverrides {
            server: Some(server.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let config = Config::resolve(overrides("relay:22"), None).unwrap();
        assert_eq!(config.relay_server, "relay:22");
        assert_eq!(config.retry_period, DEFAULT_RETRY_PERIOD);
        assert_eq!(config.host_id, "");
        assert!(config.proxy.is_none());
        assert!(config.auth.is_none());
        assert!(!config.enable_sftp);
    }

    #[test]
    fn test_resolve_requires_server() {
        let err = Config::resolve(ConfigOverrides::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "server"));
    }

    #[test]
    fn test_resolve_flags_beat_file() {
        let file = ConfigFile {
            server: Some("file-relay:22".into()),
            auth: Some("file:secret".into()),
            host_id: Some("/etc/burrow/id".into()),
            retry: Some(Duration::from_secs(30)),
            sftp: Some(true),
            ..Default::default()
        };
        let flags = ConfigOverrides {
            server: Some("flag-relay:2222".into()),
            retry: Some(Duration::from_secs(3)),
            ..Default::default()
        };

        let config = Config::resolve(flags, Some(file)).unwrap();
        assert_eq!(config.relay_server, "flag-relay:2222");
        assert_eq!(config.retry_period, Duration::from_secs(3));
        assert_eq!(config.auth.as_deref(), Some("file:secret"));
        assert_eq!(config.host_id, "/etc/burrow/id");
        assert!(config.enable_sftp);
    }

    #[test]
    fn test_resolve_rejects_zero_retry() {
        let flags = ConfigOverrides {
            retry: Some(Duration::ZERO),
            ..overrides("relay")
        };
        assert!(matches!(
            Config::resolve(flags, None),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let err = load_config::<ConfigFile>(&path).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(p) if p == path));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = \"relay.example.com\"\nretry = \"2s\"").unwrap();

        let loaded: ConfigFile = load_config(file.path()).unwrap();
        assert_eq!(loaded.server.as_deref(), Some("relay.example.com"));
        assert_eq!(loaded.retry, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_load_config_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = ").unwrap();
        assert!(matches!(
            load_config::<ConfigFile>(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("burrow/config.toml"));
    }
}
