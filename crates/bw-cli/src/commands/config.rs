//! Config resolution and the `config` subcommands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use burrow_core::config::{self, Config, ConfigFile, ConfigOverrides};
use burrow_core::error::ConfigError;

use crate::output::{format_config, print_info};

/// Path of the config file in effect
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(config::default_config_path)
}

/// Read the config file.
///
/// An explicitly named file must exist; the default one is optional.
pub fn load_config_file(explicit: Option<&Path>) -> Result<Option<ConfigFile>> {
    let path = config_file_path(explicit);
    match config::load_config::<ConfigFile>(&path) {
        Ok(file) => {
            tracing::debug!("Loaded config from {}", path.display());
            Ok(Some(file))
        }
        Err(ConfigError::NotFound(_)) if explicit.is_none() => Ok(None),
        Err(e) => Err(e).with_context(|| format!("load config {}", path.display())),
    }
}

/// Merge command-line values over the config file.
pub fn resolve_config(overrides: ConfigOverrides, explicit: Option<&Path>) -> Result<Config> {
    let file = load_config_file(explicit)?;
    Ok(Config::resolve(overrides, file)?)
}

/// Print the config file path
pub fn config_path(explicit: Option<&Path>) {
    println!("{}", config_file_path(explicit).display());
}

/// Print the effective configuration
pub fn config_show(overrides: ConfigOverrides, explicit: Option<&Path>) -> Result<()> {
    let path = config_file_path(explicit);
    if !path.exists() {
        print_info(&format!("No config file at {}", path.display()));
    }
    let config = resolve_config(overrides, explicit)?;
    print!("{}", format_config(&config));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config_file(Some(&missing)).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "server = \"relay:22\"\nretry = \"30s\"\nsftp = true").unwrap();

        let overrides = ConfigOverrides {
            server: Some("other:2222".to_string()),
            ..Default::default()
        };
        let config = resolve_config(overrides, Some(file.path())).unwrap();

        assert_eq!(config.relay_server, "other:2222");
        assert_eq!(config.retry_period, Duration::from_secs(30));
        assert!(config.enable_sftp);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "sever = \"typo:22\"").unwrap();
        assert!(load_config_file(Some(file.path())).is_err());
    }
}
