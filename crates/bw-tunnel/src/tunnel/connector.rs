//! SSH relay connector
//!
//! Speaks SSH to the relay and carries the configured port mappings over
//! it. Reversed mappings ask the relay to listen on its loopback and send
//! each inbound connection back as a `forwarded-tcpip` channel; forward
//! mappings listen locally and open a `direct-tcpip` channel per accepted
//! connection.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Config, Handle, Msg};
use russh::{Channel, Disconnect};
use russh_keys::key::PublicKey;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use burrow_core::error::TunnelError;
use burrow_core::traits::{TunnelClient, TunnelClientConfig, TunnelFactory};
use burrow_core::types::TunnelRemote;

use super::address::RelayAddress;
use super::proxy::{connect_via_proxy, ProxyUrl};

/// Time allowed for TCP connect plus SSH handshake
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between the client's own connection attempts
const ATTEMPT_DELAY: Duration = Duration::from_secs(1);

/// Creates [`SshRelayClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct SshRelayFactory;

impl TunnelFactory for SshRelayFactory {
    type Client = SshRelayClient;

    fn create(&self, config: &TunnelClientConfig) -> Result<SshRelayClient, TunnelError> {
        SshRelayClient::new(config.clone())
    }
}

/// One SSH connection to the relay carrying every configured remote
pub struct SshRelayClient {
    config: TunnelClientConfig,
    address: RelayAddress,
    proxy: Option<ProxyUrl>,
    session: Option<Arc<Handle<RelayHandler>>>,
    /// Cancelled when the SSH session task drops its handler
    ended: CancellationToken,
    /// Stops this client's listeners
    shutdown: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
}

impl SshRelayClient {
    /// Validate `config` and build an unstarted client.
    pub fn new(config: TunnelClientConfig) -> Result<Self, TunnelError> {
        let address: RelayAddress = config.server.parse()?;
        let proxy = config
            .proxy
            .as_deref()
            .map(str::parse::<ProxyUrl>)
            .transpose()?;

        if config.remotes.is_empty() {
            return Err(TunnelError::InvalidRemote("no remotes configured".to_string()));
        }

        Ok(Self {
            config,
            address,
            proxy,
            session: None,
            ended: CancellationToken::new(),
            shutdown: CancellationToken::new(),
            listeners: Vec::new(),
        })
    }

    fn announce(&self, message: &str) {
        if self.config.verbose {
            tracing::info!("{}", message);
        } else {
            tracing::debug!("{}", message);
        }
    }

    /// `user:password` splits at the first colon; a bare string is a user
    /// with an empty password.
    fn credentials(&self) -> Option<(String, String)> {
        self.config.auth.as_deref().map(|auth| match auth.split_once(':') {
            Some((user, pass)) => (user.to_string(), pass.to_string()),
            None => (auth.to_string(), String::new()),
        })
    }

    async fn dial(&self) -> Result<TcpStream, TunnelError> {
        let host = self.address.host.as_str();
        let port = self.address.port;
        match &self.proxy {
            Some(proxy) => connect_via_proxy(proxy, host, port).await,
            None => TcpStream::connect((host, port))
                .await
                .map_err(|e| TunnelError::Connect(format!("{}: {}", self.address, e))),
        }
    }

    /// Connect, handshake and authenticate once.
    async fn try_connect(&mut self) -> Result<Handle<RelayHandler>, TunnelError> {
        let reverse_ports: HashSet<u16> = self
            .config
            .remotes
            .iter()
            .filter(|r| r.reversed)
            .map(|r| r.remote_port)
            .collect();

        self.ended = CancellationToken::new();
        let handler = RelayHandler {
            reverse_ports,
            _ended: self.ended.clone().drop_guard(),
        };

        let handshake = async {
            let stream = self.dial().await?;
            client::connect_stream(Arc::new(Config::default()), stream, handler)
                .await
                .map_err(|e| TunnelError::Connect(format!("{}: {}", self.address, e)))
        };
        let mut session = tokio::time::timeout(CONNECT_TIMEOUT, handshake)
            .await
            .map_err(|_| TunnelError::Connect(format!("{}: timed out", self.address)))??;

        let authenticated = match self.credentials() {
            Some((user, pass)) => {
                tracing::debug!("Authenticating to relay as '{}'", user);
                session.authenticate_password(user, pass).await
            }
            None => session.authenticate_none(whoami::username()).await,
        }
        .map_err(|e| TunnelError::Connect(format!("authentication error: {}", e)))?;

        if !authenticated {
            return Err(TunnelError::AuthRejected);
        }

        for remote in self.config.remotes.iter().filter(|r| r.reversed) {
            let reply = session
                .tcpip_forward("127.0.0.1", u32::from(remote.remote_port))
                .await
                .map_err(|e| TunnelError::Forward(format!("{}: {}", remote, e)))?;
            tracing::debug!("Relay accepted forward {} ({:?})", remote, reply);
        }

        Ok(session)
    }

    /// Bind the local side of a forward mapping and pump accepted
    /// connections through `direct-tcpip` channels.
    async fn listen(
        &self,
        remote: TunnelRemote,
        session: Arc<Handle<RelayHandler>>,
    ) -> Result<JoinHandle<()>, TunnelError> {
        let local_port = remote.local_port.unwrap_or(remote.remote_port);
        let listener = TcpListener::bind(("127.0.0.1", local_port))
            .await
            .map_err(|e| TunnelError::Forward(format!("bind 127.0.0.1:{}: {}", local_port, e)))?;

        let shutdown = self.shutdown.clone();
        let ended = self.ended.clone();

        Ok(tokio::spawn(async move {
            loop {
                let (socket, peer) = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ended.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            tracing::warn!("Accept failed on 127.0.0.1:{}: {}", local_port, e);
                            continue;
                        }
                    },
                };

                let channel = match session
                    .channel_open_direct_tcpip(
                        "127.0.0.1",
                        u32::from(remote.remote_port),
                        peer.ip().to_string(),
                        u32::from(peer.port()),
                    )
                    .await
                {
                    Ok(channel) => channel,
                    Err(e) => {
                        tracing::warn!("Relay refused channel for {}: {}", remote, e);
                        continue;
                    }
                };

                tokio::spawn(pipe(socket, channel, remote.remote_port));
            }
            tracing::debug!("Listener on 127.0.0.1:{} stopped", local_port);
        }))
    }
}

#[async_trait]
impl TunnelClient for SshRelayClient {
    async fn start(&mut self, cancel: CancellationToken) -> Result<(), TunnelError> {
        self.shutdown = cancel.child_token();
        let attempts = self.config.max_retry_count.max(1);

        let mut last_err = None;
        let mut session = None;
        for attempt in 1..=attempts {
            match self.try_connect().await {
                Ok(s) => {
                    session = Some(s);
                    break;
                }
                Err(TunnelError::AuthRejected) => return Err(TunnelError::AuthRejected),
                Err(e) => {
                    tracing::debug!("Relay attempt {}/{} failed: {}", attempt, attempts, e);
                    last_err = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(ATTEMPT_DELAY).await;
                    }
                }
            }
        }
        let session = match session {
            Some(session) => Arc::new(session),
            None => {
                return Err(last_err
                    .unwrap_or_else(|| TunnelError::Connect(self.address.to_string())))
            }
        };

        for remote in self.config.remotes.iter().filter(|r| !r.reversed) {
            let task = self.listen(*remote, Arc::clone(&session)).await?;
            self.listeners.push(task);
        }

        let remotes: Vec<String> = self.config.remotes.iter().map(|r| r.to_string()).collect();
        self.announce(&format!(
            "Connected to relay {} ({})",
            self.address,
            remotes.join(", ")
        ));

        self.session = Some(session);
        Ok(())
    }

    async fn wait(&mut self) -> Result<(), TunnelError> {
        if self.session.is_none() {
            return Err(TunnelError::NotRunning);
        }
        self.ended.cancelled().await;
        self.announce(&format!("Relay connection to {} ended", self.address));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TunnelError> {
        self.shutdown.cancel();
        for task in self.listeners.drain(..) {
            task.abort();
        }
        if let Some(session) = self.session.take() {
            if let Err(e) = session
                .disconnect(Disconnect::ByApplication, "closing", "en")
                .await
            {
                tracing::debug!("Relay disconnect: {}", e);
            }
        }
        Ok(())
    }
}

/// Copy bytes both ways between a TCP socket and an SSH channel until
/// either side closes.
async fn pipe(mut socket: TcpStream, channel: Channel<Msg>, port: u16) {
    let mut stream = channel.into_stream();
    match tokio::io::copy_bidirectional(&mut socket, &mut stream).await {
        Ok((up, down)) => tracing::trace!("Port {} closed ({} up, {} down)", port, up, down),
        Err(e) => tracing::debug!("Port {} closed: {}", port, e),
    }
}

/// SSH client handler for the relay connection
struct RelayHandler {
    /// Ports we asked the relay to forward back
    reverse_ports: HashSet<u16>,
    /// Marks the session ended once the session task drops us
    _ended: DropGuard,
}

#[async_trait]
impl client::Handler for RelayHandler {
    type Error = anyhow::Error;

    /// The relay authenticates both ends; its host key is not pinned.
    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Relay host key: {}", server_public_key.fingerprint());
        Ok(true)
    }

    async fn server_channel_open_forwarded_tcpip(
        &mut self,
        channel: Channel<Msg>,
        connected_address: &str,
        connected_port: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        let port = match u16::try_from(connected_port) {
            Ok(port) if self.reverse_ports.contains(&port) => port,
            _ => {
                tracing::warn!(
                    "Ignoring forwarded channel for unrequested {}:{}",
                    connected_address,
                    connected_port
                );
                let _ = channel.close().await;
                return Ok(());
            }
        };

        tracing::debug!(
            "Forwarded connection to port {} from {}:{}",
            port,
            originator_address,
            originator_port
        );

        tokio::spawn(async move {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(socket) => pipe(socket, channel, port).await,
                Err(e) => {
                    tracing::warn!("Cannot reach 127.0.0.1:{}: {}", port, e);
                    let _ = channel.close().await;
                }
            }
        });

        Ok(())
    }
}
