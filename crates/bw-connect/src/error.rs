//! Connect-side error types

use thiserror::Error;

use burrow_core::error::ConfigError;

/// Errors that end the `connect` flow, named after the stage that failed
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("get host id: {0}")]
    HostId(ConfigError),

    #[error("get local port: {0}")]
    LocalPort(std::io::Error),

    #[error("ssh connect: {0}")]
    SshConnect(String),

    #[error("start session: {0}")]
    StartSession(String),

    /// The remote shell ended with a non-zero status
    #[error("remote shell exited with status {0}")]
    RemoteExit(u32),
}

impl ConnectError {
    pub(crate) fn session(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StartSession(format!("{}: {}", context, err))
    }
}

/// Errors raised inside the SFTP shell
///
/// Per-command failures are printed and the loop goes on; only
/// [`ShellError::Prompt`] ends the shell.
#[derive(Error, Debug)]
pub enum ShellError {
    /// Remote filesystem operation failed
    #[error("{0}")]
    Remote(String),

    /// Local I/O failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The next command line could not be read
    #[error("prompt: {0}")]
    Prompt(String),
}
