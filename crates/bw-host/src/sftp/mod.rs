//! SFTP subsystem

mod local;

pub use local::{attributes, LocalFsHandler};

use tokio::io::{AsyncRead, AsyncWrite};

/// Name clients use in their `subsystem` request
pub const SUBSYSTEM_NAME: &str = "sftp";

/// Serve SFTP on `stream` until the client goes away.
pub async fn serve_sftp<S>(stream: S)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    russh_sftp::server::run(stream, LocalFsHandler::new()).await;
}
