//! SSH client dialing the forwarded loopback port

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg};
use russh_keys::key::PublicKey;

use crate::error::ConnectError;

/// Client handler for the session behind the tunnel
///
/// The host key is ephemeral and the relay already authenticated both
/// ends, so any key is accepted.
pub struct SessionClientHandler;

#[async_trait]
impl client::Handler for SessionClientHandler {
    type Error = russh::Error;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        tracing::debug!("Accepting host key {}", key.fingerprint());
        Ok(true)
    }
}

/// Connect to `127.0.0.1:port` and authenticate with `none`.
///
/// The whole handshake is bounded by `timeout`.
pub async fn dial(port: u16, timeout: Duration) -> Result<Handle<SessionClientHandler>, ConnectError> {
    let config = Arc::new(client::Config::default());
    let user = whoami::username();

    let handshake = async {
        let mut handle = client::connect(config, ("127.0.0.1", port), SessionClientHandler)
            .await
            .map_err(|e| ConnectError::SshConnect(e.to_string()))?;

        let accepted = handle
            .authenticate_none(&user)
            .await
            .map_err(|e| ConnectError::SshConnect(e.to_string()))?;
        if !accepted {
            return Err(ConnectError::SshConnect(format!(
                "authentication rejected for user {}",
                user
            )));
        }
        Ok(handle)
    };

    match tokio::time::timeout(timeout, handshake).await {
        Ok(result) => {
            if result.is_ok() {
                tracing::debug!("SSH session established on port {}", port);
            }
            result
        }
        Err(_) => Err(ConnectError::SshConnect(format!(
            "timed out after {:?}",
            timeout
        ))),
    }
}

/// Wait for the host's reply to a request sent with `want_reply`.
///
/// `stage` names the request in the returned error.
pub(crate) async fn confirm(channel: &mut Channel<Msg>, stage: &str) -> Result<(), ConnectError> {
    loop {
        match channel.wait().await {
            Some(ChannelMsg::Success) => return Ok(()),
            Some(ChannelMsg::Failure) => {
                return Err(ConnectError::session(stage, "refused by host"));
            }
            Some(ChannelMsg::Close) | None => {
                return Err(ConnectError::session(stage, "channel closed by host"));
            }
            Some(other) => tracing::trace!("Skipping {:?} before {} reply", other, stage),
        }
    }
}

/// Whether `err` only reports the peer going away
pub(crate) fn is_normal_close(err: &russh::Error) -> bool {
    match err {
        russh::Error::Disconnect | russh::Error::HUP => true,
        russh::Error::IO(e) => e.kind() == std::io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dial_refused() {
        let port = burrow_core::endpoint::free_local_port().unwrap();
        let Err(err) = dial(port, Duration::from_secs(5)).await else {
            panic!("dial to a closed port succeeded");
        };
        assert!(matches!(err, ConnectError::SshConnect(_)));
        assert!(err.to_string().starts_with("ssh connect: "));
    }

    #[tokio::test]
    async fn test_dial_times_out_on_silent_peer() {
        // Accepts but never speaks SSH
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _peer = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let Err(err) = dial(port, Duration::from_millis(200)).await else {
            panic!("dial to a silent peer succeeded");
        };
        assert!(err.to_string().contains("timed out"));
    }

    #[test]
    fn test_normal_close() {
        assert!(is_normal_close(&russh::Error::Disconnect));
        assert!(is_normal_close(&russh::Error::IO(std::io::Error::from(
            std::io::ErrorKind::UnexpectedEof
        ))));
        assert!(!is_normal_close(&russh::Error::IO(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied
        ))));
    }
}
