//! `host` and `connect` commands

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use burrow_connect::ConnectError;
use burrow_core::config::Config;

use crate::output::print_info;

/// Expose this machine until cancelled
pub async fn host_command(config: Config, cancel: CancellationToken) -> Result<()> {
    print_info(&format!("Hosting through {}", config.relay_server));
    burrow_host::host(cancel, config).await.context("host")
}

/// Connect to a host. Returns the exit code the process should end with.
pub async fn connect_command(config: Config, cancel: CancellationToken) -> Result<i32> {
    match burrow_connect::connect(cancel, config).await {
        Ok(()) => Ok(0),
        Err(ConnectError::RemoteExit(status)) => {
            tracing::debug!("Remote shell exited with {}", status);
            Ok(i32::try_from(status).unwrap_or(1))
        }
        Err(e) => Err(e).context("connect"),
    }
}
