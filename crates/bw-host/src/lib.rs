//! burrow-host: the host side of burrow
//!
//! Runs an SSH server on a loopback port derived from the host identifier
//! and keeps a reversed relay tunnel pointed at it. Each session gets a PTY
//! shell, or the SFTP subsystem when enabled.

pub mod error;
pub mod host;
pub mod pty;
pub mod server;
pub mod sftp;

pub use error::HostError;
pub use host::host;
pub use server::{serve, SessionServer};
