//! SSH session handler implementation
//!
//! One handler per accepted connection. Each session channel gets a PTY
//! shell or, when enabled, the SFTP subsystem.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::server::{Auth, Handler, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec, MethodSet};
use russh_keys::key::KeyPair;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use burrow_core::types::TerminalSize;

use crate::error::HostError;
use crate::pty::{start_session, PtyRequest, ShellSpawner};
use crate::sftp::{serve_sftp, SUBSYSTEM_NAME};

/// Written to the client when `shell` arrives without a `pty-req`
pub const NO_PTY_MESSAGE: &[u8] = b"No PTY requested.\n";

#[derive(Default)]
struct ChannelState {
    /// Held until the channel is claimed by a subsystem
    channel: Option<Channel<Msg>>,
    pty: Option<PtyRequest>,
    input: Option<mpsc::Sender<Vec<u8>>>,
    resize: Option<mpsc::UnboundedSender<TerminalSize>>,
    task: Option<JoinHandle<()>>,
}

/// Handler for a single SSH client connection
pub struct SessionHandler {
    peer_addr: SocketAddr,
    spawner: Arc<dyn ShellSpawner>,
    enable_sftp: bool,
    channels: HashMap<ChannelId, ChannelState>,
}

impl SessionHandler {
    pub fn new(peer_addr: SocketAddr, spawner: Arc<dyn ShellSpawner>, enable_sftp: bool) -> Self {
        Self {
            peer_addr,
            spawner,
            enable_sftp,
            channels: HashMap::new(),
        }
    }

    /// Write `message`, exit 1 and close.
    fn refuse_shell(channel: ChannelId, message: &[u8], session: &mut Session) {
        session.data(channel, CryptoVec::from_slice(message));
        session.exit_status_request(channel, 1);
        session.eof(channel);
        session.close(channel);
    }
}

impl Drop for SessionHandler {
    fn drop(&mut self) {
        let running = self
            .channels
            .values()
            .filter(|state| state.task.as_ref().is_some_and(|t| !t.is_finished()))
            .count();
        if running > 0 {
            tracing::debug!(
                "Connection from {} dropped with {} shell(s) running",
                self.peer_addr,
                running
            );
        }
    }
}

#[async_trait]
impl Handler for SessionHandler {
    type Error = anyhow::Error;

    /// The relay authenticates both ends, so `none` is accepted.
    async fn auth_none(&mut self, user: &str) -> Result<Auth, Self::Error> {
        tracing::debug!("Accepting '{}' from {}", user, self.peer_addr);
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        tracing::debug!("Channel opened: {:?}", channel.id());
        self.channels.insert(
            channel.id(),
            ChannelState {
                channel: Some(channel),
                ..Default::default()
            },
        );
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(russh::Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let size = TerminalSize::from_ssh(col_width, row_height);
        tracing::debug!("PTY requested on {:?}: {} {}x{}", channel, term, size.cols, size.rows);

        match self.channels.get_mut(&channel) {
            Some(state) => {
                state.pty = Some(PtyRequest {
                    term: term.to_string(),
                    size,
                });
                session.channel_success(channel);
            }
            None => session.channel_failure(channel),
        }
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let Some(state) = self.channels.get_mut(&channel) else {
            session.channel_failure(channel);
            return Ok(());
        };
        session.channel_success(channel);

        let Some(pty) = state.pty.clone() else {
            tracing::debug!("Shell without PTY on {:?}", channel);
            Self::refuse_shell(channel, NO_PTY_MESSAGE, session);
            return Ok(());
        };

        // Shell traffic goes through the handler callbacks
        state.channel = None;

        let started = self
            .spawner
            .spawn(&pty)
            .and_then(|shell| start_session(session.handle(), channel, shell));

        match started {
            Ok((io, task)) => {
                tracing::info!("Shell started on {:?} for {}", channel, self.peer_addr);
                state.input = Some(io.input);
                state.resize = Some(io.resize);
                state.task = Some(task);
            }
            Err(e) => {
                tracing::error!("Failed to start shell on {:?}: {}", channel, e);
                Self::refuse_shell(channel, format!("{}\n", e).as_bytes(), session);
            }
        }
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let size = TerminalSize::from_ssh(col_width, row_height);
        if let Some(state) = self.channels.get_mut(&channel) {
            if let Some(pty) = state.pty.as_mut() {
                pty.size = size;
            }
            if let Some(resize) = &state.resize {
                let _ = resize.send(size);
            }
        }
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let claimed = if name == SUBSYSTEM_NAME && self.enable_sftp {
            self.channels
                .get_mut(&channel)
                .and_then(|state| state.channel.take())
        } else {
            None
        };

        let Some(sftp_channel) = claimed else {
            tracing::debug!("Refusing subsystem '{}' on {:?}", name, channel);
            session.channel_failure(channel);
            // Nothing will ever serve this channel unless a shell owns it
            let idle = self
                .channels
                .get(&channel)
                .is_some_and(|state| state.task.is_none());
            if idle {
                self.channels.remove(&channel);
                session.close(channel);
            }
            return Ok(());
        };

        session.channel_success(channel);
        tracing::info!("SFTP session started on {:?} for {}", channel, self.peer_addr);
        tokio::spawn(serve_sftp(sftp_channel.into_stream()));
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::trace!("Received {} bytes on channel {:?}", data.len(), channel);

        let input = self
            .channels
            .get(&channel)
            .and_then(|state| state.input.clone());
        if let Some(input) = input {
            if input.send(data.to_vec()).await.is_err() {
                tracing::debug!("Shell input closed on {:?}", channel);
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel EOF: {:?}", channel);
        if let Some(state) = self.channels.get_mut(&channel) {
            state.input = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        tracing::debug!("Channel closed: {:?}", channel);
        self.channels.remove(&channel);
        Ok(())
    }
}

/// Build the russh server configuration with an ephemeral Ed25519 key.
pub fn server_config() -> Result<Arc<russh::server::Config>, HostError> {
    let host_key = KeyPair::generate_ed25519().ok_or(HostError::HostKey)?;
    tracing::debug!(
        "Generated ephemeral host key {}",
        host_key
            .clone_public_key()
            .map(|k| k.fingerprint())
            .unwrap_or_default()
    );

    let mut config = russh::server::Config::default();
    config.keys.push(host_key);
    config.methods = MethodSet::NONE;
    config.auth_rejection_time = Duration::from_secs(1);
    config.auth_rejection_time_initial = Some(Duration::from_secs(0));

    Ok(Arc::new(config))
}
