//! Bridges one SSH channel to one PTY shell
//!
//! Three tasks carry the traffic: channel input into the PTY writer, PTY
//! output back onto the channel, and window changes into PTY resizes. The
//! session task itself waits for the child and then closes the channel.

use std::io::{Read, Write};
use std::time::Duration;

use russh::server::Handle;
use russh::{ChannelId, CryptoVec};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use burrow_core::types::TerminalSize;

use super::shell::{PtyParts, PtyShell};

/// How long to let buffered output drain after the child exits
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Capacity of the per-session input and output queues
const SESSION_CHANNEL_CAPACITY: usize = 256;

/// Handler-side ends of a running session
pub struct SessionIo {
    /// Bytes received on the channel
    pub input: mpsc::Sender<Vec<u8>>,
    /// Window-change events
    pub resize: mpsc::UnboundedSender<TerminalSize>,
}

/// Start bridging `channel` to `shell`. Returns the senders the SSH handler
/// feeds, and the session task.
pub fn start_session(
    handle: Handle,
    channel: ChannelId,
    shell: PtyShell,
) -> Result<(SessionIo, JoinHandle<()>), burrow_core::error::SessionError> {
    let PtyParts {
        reader,
        writer,
        resizer,
        mut child,
    } = shell.into_parts()?;

    let (input_tx, input_rx) = mpsc::channel::<Vec<u8>>(SESSION_CHANNEL_CAPACITY);
    let (resize_tx, mut resize_rx) = mpsc::unbounded_channel::<TerminalSize>();
    let (output_tx, mut output_rx) = mpsc::channel::<Vec<u8>>(SESSION_CHANNEL_CAPACITY);

    let input_task = spawn_pty_writer(channel, writer, input_rx);
    spawn_pty_reader(channel, reader, output_tx);

    let output_handle = handle.clone();
    let output_task = tokio::spawn(async move {
        while let Some(data) = output_rx.recv().await {
            if output_handle
                .data(channel, CryptoVec::from_slice(&data))
                .await
                .is_err()
            {
                tracing::debug!("Channel {:?} gone, dropping PTY output", channel);
                break;
            }
        }
    });

    let resize_task = tokio::spawn(async move {
        while let Some(size) = resize_rx.recv().await {
            if let Err(e) = resizer.resize(size) {
                tracing::warn!("Failed to resize PTY for {:?}: {}", channel, e);
            }
        }
        // resizer drops here, releasing the PTY master
    });

    let session = tokio::spawn(async move {
        let status = tokio::task::spawn_blocking(move || child.wait()).await;
        let exit_code = match status {
            Ok(Ok(status)) => status.exit_code(),
            Ok(Err(e)) => {
                tracing::warn!("Failed to wait for shell on {:?}: {}", channel, e);
                1
            }
            Err(e) => {
                tracing::error!("Shell wait task failed on {:?}: {}", channel, e);
                1
            }
        };
        tracing::info!("Shell on {:?} exited with code {}", channel, exit_code);

        if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, output_task)
            .await
            .is_err()
        {
            tracing::debug!("Output for {:?} still pending after exit", channel);
        }

        let _ = handle.exit_status_request(channel, exit_code).await;
        let _ = handle.eof(channel).await;
        let _ = handle.close(channel).await;

        resize_task.abort();
        input_task.abort();
    });

    Ok((
        SessionIo {
            input: input_tx,
            resize: resize_tx,
        },
        session,
    ))
}

/// Blocking task writing channel input into the PTY.
fn spawn_pty_writer(
    channel: ChannelId,
    mut writer: Box<dyn Write + Send>,
    mut input_rx: mpsc::Receiver<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        while let Some(data) = input_rx.blocking_recv() {
            if let Err(e) = writer.write_all(&data).and_then(|_| writer.flush()) {
                tracing::debug!("PTY write failed for {:?}: {}", channel, e);
                break;
            }
        }
        tracing::debug!("PTY writer exiting for {:?}", channel);
    })
}

/// Blocking task reading PTY output until the slave side closes.
fn spawn_pty_reader(
    channel: ChannelId,
    mut reader: Box<dyn Read + Send>,
    tx: mpsc::Sender<Vec<u8>>,
) -> JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut buf = [0u8; 4096];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => {
                    tracing::debug!("PTY reader EOF for {:?}", channel);
                    break;
                }
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        tracing::debug!("PTY output channel closed for {:?}", channel);
                        break;
                    }
                }
                Err(e) => {
                    // EIO is how Linux reports the slave closing
                    if e.kind() == std::io::ErrorKind::Other
                        || e.kind() == std::io::ErrorKind::BrokenPipe
                        || e.raw_os_error() == Some(5)
                    {
                        tracing::debug!("PTY reader closed for {:?}: {}", channel, e);
                    } else {
                        tracing::error!("PTY read error for {:?}: {}", channel, e);
                    }
                    break;
                }
            }
        }
    })
}
