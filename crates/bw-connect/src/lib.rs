//! burrow-connect: the connect side of burrow
//!
//! Opens a forward tunnel to the port a host derived from the shared
//! identifier, then speaks SSH through it: either an interactive terminal
//! bridged in raw mode, or an SFTP command shell.

pub mod client;
pub mod connect;
pub mod error;
pub mod sftp;
pub mod terminal;

pub use connect::connect;
pub use error::{ConnectError, ShellError};
pub use sftp::{RemoteFs, SftpRemote, SftpShell};
