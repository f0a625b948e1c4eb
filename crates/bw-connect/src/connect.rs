//! The `connect` flow

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use burrow_core::config::Config;
use burrow_core::endpoint::{free_local_port, host_port};
use burrow_core::types::TunnelRemote;
use burrow_tunnel::{SshRelayFactory, TunnelSupervisor};

use crate::client::{dial, is_normal_close};
use crate::error::ConnectError;
use crate::sftp::run_sftp;
use crate::terminal::run_terminal;

/// How long to wait for the tunnel before dialing anyway
pub const TUNNEL_READY_TIMEOUT: Duration = Duration::from_secs(1);

/// Reach the host sharing `config.host_id` and run a terminal or SFTP
/// session on it.
///
/// The tunnel is torn down when the session ends, whatever the outcome.
pub async fn connect(cancel: CancellationToken, config: Config) -> Result<(), ConnectError> {
    let remote_port = host_port(&config.host_id).map_err(ConnectError::HostId)?;
    let local_port = free_local_port().map_err(ConnectError::LocalPort)?;
    tracing::info!("Forwarding 127.0.0.1:{} to relay port {}", local_port, remote_port);

    let tunnel_cancel = cancel.child_token();
    let mut tunnel = TunnelSupervisor::spawn(
        SshRelayFactory,
        TunnelRemote::forward(local_port, remote_port),
        &config,
        tunnel_cancel.clone(),
    );

    if !tunnel.wait_connected(TUNNEL_READY_TIMEOUT).await {
        tracing::debug!("Tunnel not reported up after {:?}, dialing anyway", TUNNEL_READY_TIMEOUT);
    }

    let result = session(local_port, &config).await;

    tunnel_cancel.cancel();
    tunnel.join().await;
    result
}

async fn session(local_port: u16, config: &Config) -> Result<(), ConnectError> {
    let handle = dial(local_port, config.retry_period).await?;

    let result = if config.enable_sftp {
        run_sftp(&handle).await
    } else {
        match run_terminal(&handle).await {
            Ok(Some(status)) if status != 0 => Err(ConnectError::RemoteExit(status)),
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        }
    };

    if let Err(e) = handle
        .disconnect(russh::Disconnect::ByApplication, "", "English")
        .await
    {
        if !is_normal_close(&e) {
            tracing::debug!("SSH disconnect: {}", e);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::error::ConfigError;

    fn config(host_id: &str) -> Config {
        Config {
            host_id: host_id.to_string(),
            proxy: None,
            auth: None,
            retry_period: Duration::from_millis(200),
            relay_server: "127.0.0.1:1".to_string(),
            enable_sftp: false,
        }
    }

    #[tokio::test]
    async fn test_invalid_host_id_fails_first() {
        let err = connect(CancellationToken::new(), config("not-a-uuid"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::HostId(_)));
        assert_eq!(
            err.to_string(),
            "get host id: host id should be either uuid or path to file with it"
        );
    }

    #[tokio::test]
    async fn test_host_id_deriving_port_zero_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id");
        std::fs::write(&path, "id-35768").unwrap();

        let err = connect(CancellationToken::new(), config(path.to_str().unwrap()))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::HostId(ConfigError::Invalid(_))));
        assert!(err.to_string().contains("relay port 0"));
    }

    #[tokio::test]
    async fn test_unreachable_tunnel_fails_at_ssh_connect() {
        let err = connect(
            CancellationToken::new(),
            config("0b6c0a7e-5a3f-4f8a-9d55-0a8f1a2f7c11"),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("ssh connect: "));
    }
}
