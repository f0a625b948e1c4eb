//! Interactive terminal session
//!
//! Puts the local terminal in raw mode and bridges it byte for byte to a
//! remote shell. Local resizes are forwarded as window changes.

use std::io::{Read, Write};

use crossterm::terminal;
use russh::client::Handle;
use russh::{ChannelMsg, Pty};
use tokio::sync::mpsc;

use burrow_core::types::TerminalSize;

use crate::client::{confirm, SessionClientHandler};
use crate::error::ConnectError;

/// Terminal type requested for the remote PTY
pub const TERM: &str = "xterm-256color";

/// Terminal modes sent with the PTY request
const PTY_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::TTY_OP_ISPEED, 14400),
    (Pty::TTY_OP_OSPEED, 14400),
];

/// SSH extended data type for stderr
const EXTENDED_DATA_STDERR: u32 = 1;

/// Keeps the local terminal in raw mode; restores it on drop.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> std::io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if let Err(e) = terminal::disable_raw_mode() {
            tracing::warn!("Failed to restore terminal mode: {}", e);
        }
    }
}

/// Current size of the local terminal, 80x24 when it cannot be read
pub fn local_size() -> TerminalSize {
    match terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(rows, cols),
        Ok(_) => TerminalSize::default(),
        Err(e) => {
            tracing::warn!("Failed to get terminal size: {}", e);
            TerminalSize::default()
        }
    }
}

/// Read stdin on a plain thread. A runtime blocking task would hold
/// shutdown until the next keypress.
fn spawn_stdin_pump() -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>(64);

    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });

    rx
}

/// Window-change notifications for the local terminal
struct ResizeEvents {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl ResizeEvents {
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let signal = match signal(SignalKind::window_change()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::debug!("Window change notifications unavailable: {}", e);
                    None
                }
            };
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    /// Resolve with the new size on the next resize; pending forever when
    /// notifications are unavailable.
    async fn next(&mut self) -> TerminalSize {
        #[cfg(unix)]
        if let Some(signal) = self.signal.as_mut() {
            if signal.recv().await.is_some() {
                return local_size();
            }
            self.signal = None;
        }
        std::future::pending().await
    }
}

fn write_out(mut out: impl Write, data: &[u8]) {
    if let Err(e) = out.write_all(data).and_then(|_| out.flush()) {
        tracing::debug!("Local write failed: {}", e);
    }
}

/// Run an interactive shell over `handle` until the remote side exits.
///
/// Returns the remote exit status when the server sent one.
pub async fn run_terminal(handle: &Handle<SessionClientHandler>) -> Result<Option<u32>, ConnectError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ConnectError::session("new ssh session", e))?;

    let size = local_size();
    let _raw = RawModeGuard::enable()
        .map_err(|e| ConnectError::session("put terminal in raw mode", e))?;

    channel
        .request_pty(
            true,
            TERM,
            u32::from(size.cols),
            u32::from(size.rows),
            0,
            0,
            PTY_MODES,
        )
        .await
        .map_err(|e| ConnectError::session("request session pty", e))?;
    confirm(&mut channel, "request session pty").await?;
    channel
        .request_shell(true)
        .await
        .map_err(|e| ConnectError::session("start session shell", e))?;
    confirm(&mut channel, "start session shell").await?;

    let mut stdin = spawn_stdin_pump();
    let mut stdin_open = true;
    let mut resizes = ResizeEvents::new();
    let mut exit_status = None;

    loop {
        tokio::select! {
            input = stdin.recv(), if stdin_open => match input {
                Some(data) => {
                    if let Err(e) = channel.data(&data[..]).await {
                        tracing::debug!("Failed to send input: {}", e);
                    }
                }
                None => {
                    stdin_open = false;
                    let _ = channel.eof().await;
                }
            },

            size = resizes.next() => {
                tracing::debug!("Local terminal resized to {}x{}", size.cols, size.rows);
                if let Err(e) = channel
                    .window_change(u32::from(size.cols), u32::from(size.rows), 0, 0)
                    .await
                {
                    tracing::debug!("Failed to send window change: {}", e);
                }
            }

            msg = channel.wait() => match msg {
                Some(ChannelMsg::Data { ref data }) => write_out(std::io::stdout().lock(), data),
                Some(ChannelMsg::ExtendedData { ref data, ext }) if ext == EXTENDED_DATA_STDERR => {
                    write_out(std::io::stderr().lock(), data)
                }
                Some(ChannelMsg::ExitStatus { exit_status: status }) => {
                    tracing::debug!("Remote shell exited with {}", status);
                    exit_status = Some(status);
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            },
        }
    }

    Ok(exit_status)
}
