//! The `host` flow

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use burrow_core::config::Config;
use burrow_core::endpoint::host_port;
use burrow_core::types::TunnelRemote;
use burrow_tunnel::{SshRelayFactory, TunnelSupervisor};

use crate::error::HostError;
use crate::pty::ReexecSpawner;
use crate::server::SessionServer;

/// Expose this machine's shell through the relay until `cancel` fires.
///
/// Binds the session server on the derived port, keeps a reversed tunnel
/// for that port alive, and returns once the accept loop stops.
pub async fn host(cancel: CancellationToken, config: Config) -> Result<(), HostError> {
    let port = host_port(&config.host_id).map_err(HostError::HostId)?;
    tracing::info!("Derived port {} from host id", port);

    let server = SessionServer::new(Arc::new(ReexecSpawner::current()?), config.enable_sftp)?;
    let listener = server.bind(port).await?;

    let tunnel = TunnelSupervisor::spawn(
        SshRelayFactory,
        TunnelRemote::reverse(port),
        &config,
        cancel.clone(),
    );

    server.run(listener, cancel).await;
    tunnel.join().await;
    Ok(())
}
