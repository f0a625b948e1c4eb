//! SFTP mode of the connect side

pub mod path;
mod progress;
pub mod prompt;
mod remote;
mod shell;

pub use prompt::{Input, LinePrompt, Prompt, ScriptedPrompt};
pub use remote::{RemoteEntry, RemoteFs, RemoteMetadata, RemoteReader, RemoteWriter, SftpRemote};
pub use shell::{SftpShell, PROMPT};

use russh::client::Handle;
use russh_sftp::client::SftpSession;

use crate::client::{confirm, SessionClientHandler};
use crate::error::ConnectError;

/// Open the `sftp` subsystem over `handle` and run the interactive shell
/// on it until `exit` or end of input.
pub async fn run_sftp(handle: &Handle<SessionClientHandler>) -> Result<(), ConnectError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ConnectError::session("new ssh session", e))?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| ConnectError::session("request sftp subsystem", e))?;
    confirm(&mut channel, "request sftp subsystem").await?;

    let sftp = SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| ConnectError::session("new sftp client", e))?;

    let mut shell = SftpShell::new(SftpRemote::new(sftp))
        .await
        .map_err(|e| ConnectError::session("get working directory", e))?;
    let mut prompt = LinePrompt::new().map_err(|e| ConnectError::session("new sftp client", e))?;

    let result = shell.run(&mut prompt).await;

    let (remote, _) = shell.into_inner();
    if let Err(e) = remote.close().await {
        tracing::debug!("SFTP session close: {}", e);
    }

    result.map_err(|e| ConnectError::session("sftp", e))
}
