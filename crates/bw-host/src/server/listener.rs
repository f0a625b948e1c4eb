//! SSH session server listener
//!
//! Accepts loopback connections arriving through the relay and runs each
//! through its own handler.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::HostError;
use crate::pty::{ReexecSpawner, ShellSpawner};
use crate::server::handler::{server_config, SessionHandler};

/// SSH server exposing shells (and optionally SFTP) on the loopback
pub struct SessionServer {
    ssh_config: Arc<russh::server::Config>,
    spawner: Arc<dyn ShellSpawner>,
    enable_sftp: bool,
}

impl SessionServer {
    /// Create a server with a fresh host key
    pub fn new(spawner: Arc<dyn ShellSpawner>, enable_sftp: bool) -> Result<Self, HostError> {
        Ok(Self {
            ssh_config: server_config()?,
            spawner,
            enable_sftp,
        })
    }

    /// Bind `127.0.0.1:port`
    pub async fn bind(&self, port: u16) -> Result<TcpListener, HostError> {
        TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|error| HostError::Bind { port, error })
    }

    /// Accept connections until `cancel` fires. Sessions already running
    /// are left to finish on their own.
    pub async fn run(&self, listener: TcpListener, cancel: CancellationToken) {
        match listener.local_addr() {
            Ok(addr) => tracing::info!("Session server listening on {}", addr),
            Err(e) => tracing::debug!("Session server listening (address unknown: {})", e),
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Session server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.handle_connection(socket, peer_addr),
                        Err(e) => tracing::error!("Failed to accept connection: {}", e),
                    }
                }
            }
        }
    }

    /// Bind and run in one step
    pub async fn serve(&self, port: u16, cancel: CancellationToken) -> Result<(), HostError> {
        let listener = self.bind(port).await?;
        self.run(listener, cancel).await;
        Ok(())
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!("New connection from {}", peer_addr);

        let config = Arc::clone(&self.ssh_config);
        let handler = SessionHandler::new(peer_addr, Arc::clone(&self.spawner), self.enable_sftp);

        tokio::spawn(async move {
            match russh::server::run_stream(config, socket, handler).await {
                Ok(session) => match session.await {
                    Ok(()) => tracing::debug!("Connection from {} closed normally", peer_addr),
                    Err(e) => tracing::debug!("Connection from {} closed: {}", peer_addr, e),
                },
                Err(e) => tracing::warn!("Handshake with {} failed: {}", peer_addr, e),
            }
        });
    }
}

/// Serve shells on `127.0.0.1:port`, re-executing this binary for each one.
pub async fn serve(cancel: CancellationToken, port: u16, enable_sftp: bool) -> Result<(), HostError> {
    let spawner = Arc::new(ReexecSpawner::current()?);
    SessionServer::new(spawner, enable_sftp)?
        .serve(port, cancel)
        .await
}
