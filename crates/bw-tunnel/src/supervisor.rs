//! Tunnel supervision
//!
//! Keeps exactly one relay client alive at a time, recreating it on a
//! fixed period whenever it exits, until cancelled.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use burrow_core::config::Config;
use burrow_core::error::TunnelError;
use burrow_core::traits::{TunnelClient, TunnelClientConfig, TunnelFactory};
use burrow_core::types::{TunnelRemote, TunnelState};

/// Runs the retry loop for one tunnel mapping
pub struct TunnelSupervisor<F: TunnelFactory> {
    factory: F,
    client_config: TunnelClientConfig,
    retry_period: Duration,
    state: watch::Sender<TunnelState>,
}

/// Observer side of a running supervisor
///
/// Dropping the handle does not stop the supervisor; cancel its token.
pub struct SupervisorHandle {
    state: watch::Receiver<TunnelState>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    /// Subscribe to state changes
    pub fn state(&self) -> watch::Receiver<TunnelState> {
        self.state.clone()
    }

    /// Wait until the tunnel reports [`TunnelState::Connected`], giving up
    /// after `limit` or once the supervisor stops. Returns whether the
    /// tunnel came up.
    pub async fn wait_connected(&mut self, limit: Duration) -> bool {
        let state = &mut self.state;
        let ready = async {
            state
                .wait_for(|s| matches!(s, TunnelState::Connected | TunnelState::Stopped))
                .await
                .map(|s| *s == TunnelState::Connected)
                .unwrap_or(false)
        };
        tokio::time::timeout(limit, ready).await.unwrap_or(false)
    }

    /// Wait for the supervisor task to exit
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::error!("Tunnel supervisor task failed: {}", e);
        }
    }
}

impl<F: TunnelFactory> TunnelSupervisor<F> {
    /// Start supervising `remote` in the background.
    pub fn spawn(
        factory: F,
        remote: TunnelRemote,
        config: &Config,
        cancel: CancellationToken,
    ) -> SupervisorHandle {
        let (state, rx) = watch::channel(TunnelState::Idle);
        let supervisor = Self {
            factory,
            client_config: TunnelClientConfig {
                server: config.relay_server.clone(),
                proxy: config.proxy.clone(),
                auth: config.auth.clone(),
                remotes: vec![remote],
                verbose: true,
                max_retry_count: 1,
            },
            retry_period: config.retry_period,
            state,
        };

        let task = tokio::spawn(supervisor.run(cancel));
        SupervisorHandle { state: rx, task }
    }

    fn publish(&self, state: TunnelState) {
        self.state.send_replace(state);
    }

    async fn run(self, cancel: CancellationToken) {
        let mut ticker = interval(self.retry_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            self.publish(TunnelState::Connecting);

            let mut client = match self.factory.create(&self.client_config) {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!("Failed to create tunnel client: {}", e);
                    self.publish(TunnelState::Failed(e.to_string()));
                    self.publish(TunnelState::Stopped);
                    return;
                }
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.attempt(&mut client, cancel.clone()) => Some(result),
            };

            match outcome {
                None => {
                    self.shutdown(&mut client).await;
                    return;
                }
                Some(Ok(())) => {
                    tracing::debug!("Tunnel closed, retrying in {:?}", self.retry_period);
                    self.publish(TunnelState::Disconnected);
                }
                Some(Err(e)) => {
                    tracing::warn!("Tunnel failed: {}", e);
                    self.publish(TunnelState::Failed(e.to_string()));
                }
            }

            if let Err(e) = client.close().await {
                tracing::debug!("Tunnel close: {}", e);
            }
            drop(client);

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Tunnel supervisor cancelled");
                    self.publish(TunnelState::Stopped);
                    return;
                }
                _ = ticker.tick() => {}
            }
        }
    }

    async fn attempt(
        &self,
        client: &mut F::Client,
        cancel: CancellationToken,
    ) -> Result<(), TunnelError> {
        client.start(cancel).await?;
        self.publish(TunnelState::Connected);
        client.wait().await
    }

    async fn shutdown(&self, client: &mut F::Client) {
        tracing::debug!("Tunnel supervisor cancelled, closing active client");
        if let Err(e) = client.close().await {
            tracing::debug!("Tunnel close: {}", e);
        }
        self.publish(TunnelState::Stopped);
    }
}
