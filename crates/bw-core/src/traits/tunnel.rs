//! Tunnel capability traits

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TunnelError;
use crate::types::TunnelRemote;

/// Parameters for one tunnel client instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelClientConfig {
    /// Relay server address
    pub server: String,
    /// HTTP CONNECT proxy URL
    pub proxy: Option<String>,
    /// Opaque relay credential
    pub auth: Option<String>,
    /// Port mappings to establish
    pub remotes: Vec<TunnelRemote>,
    /// Log connection details at info rather than debug
    pub verbose: bool,
    /// Connection attempts the client may make on its own
    pub max_retry_count: u32,
}

/// A single connection to the relay.
///
/// A client is started once, waited on once and closed; the supervisor
/// creates a fresh one for every attempt.
#[async_trait]
pub trait TunnelClient: Send {
    /// Connect to the relay and set up every configured remote.
    async fn start(&mut self, cancel: CancellationToken) -> Result<(), TunnelError>;

    /// Block until the relay connection ends.
    async fn wait(&mut self) -> Result<(), TunnelError>;

    /// Tear the connection down. Safe to call more than once.
    async fn close(&mut self) -> Result<(), TunnelError>;
}

/// Builds tunnel clients.
pub trait TunnelFactory: Send + Sync + 'static {
    /// The client type produced
    type Client: TunnelClient + 'static;

    /// Create a client for `config`. Failure here means the configuration
    /// itself is unusable.
    fn create(&self, config: &TunnelClientConfig) -> Result<Self::Client, TunnelError>;
}
