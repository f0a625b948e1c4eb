//! Host-side error types

use thiserror::Error;

use burrow_core::error::{ConfigError, SessionError};

/// Errors that end the `host` flow
#[derive(Error, Debug)]
pub enum HostError {
    /// Host identifier could not be resolved
    #[error("get host id: {0}")]
    HostId(ConfigError),

    /// Session server could not bind its loopback port
    #[error("failed to listen on 127.0.0.1:{port}: {error}")]
    Bind { port: u16, error: std::io::Error },

    /// Ephemeral host key could not be generated
    #[error("failed to generate Ed25519 host key")]
    HostKey,

    /// Shell support could not be set up
    #[error(transparent)]
    Session(#[from] SessionError),
}
