//! Core error types for burrow

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
///
/// These are fatal: they are reported once to the CLI layer and the process
/// exits non-zero.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Host identifier is neither a readable file nor a UUID
    #[error("host id should be either uuid or path to file with it")]
    InvalidHostId,
}

/// Tunnel-related errors
///
/// Everything except [`TunnelError::InvalidRemote`] and
/// [`TunnelError::InvalidServer`] is considered transient by the supervisor.
#[derive(Error, Debug)]
pub enum TunnelError {
    /// Remote mapping spec could not be parsed
    #[error("Invalid remote spec: {0}")]
    InvalidRemote(String),

    /// Relay server address could not be parsed
    #[error("Invalid relay server address: {0}")]
    InvalidServer(String),

    /// Proxy negotiation failed
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Could not reach or handshake with the relay
    #[error("Relay connection failed: {0}")]
    Connect(String),

    /// Relay rejected the supplied credentials
    #[error("Authentication rejected by relay")]
    AuthRejected,

    /// Relay refused or broke a port forward
    #[error("Forwarding error: {0}")]
    Forward(String),

    /// Client used before `start` or after `close`
    #[error("Tunnel client is not running")]
    NotRunning,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session-related errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// PTY allocation failed
    #[error("PTY allocation failed: {0}")]
    PtyAllocation(String),

    /// Shell process could not be started
    #[error("Failed to spawn shell: {0}")]
    Spawn(String),
}
