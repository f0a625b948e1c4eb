//! Session server integration tests
//!
//! Drives the server with a real russh client over loopback.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::ChannelMsg;
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use burrow_host::pty::CommandSpawner;
use burrow_host::server::{SessionServer, NO_PTY_MESSAGE};

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestClient;

#[async_trait]
impl client::Handler for TestClient {
    type Error = anyhow::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Start a server on an OS-assigned port
async fn start_server(spawner: CommandSpawner, enable_sftp: bool) -> (u16, CancellationToken) {
    let server = SessionServer::new(Arc::new(spawner), enable_sftp).unwrap();
    let listener = server.bind(0).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move { server.run(listener, token).await });
    (port, cancel)
}

async fn connect(port: u16) -> client::Handle<TestClient> {
    let mut session = client::connect(
        Arc::new(client::Config::default()),
        ("127.0.0.1", port),
        TestClient,
    )
    .await
    .unwrap();
    assert!(session.authenticate_none("tester").await.unwrap());
    session
}

/// Collect output and exit status until the server closes the channel
async fn drain(channel: &mut russh::Channel<client::Msg>) -> (Vec<u8>, Option<u32>) {
    let mut output = Vec::new();
    let mut exit = None;
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => output.extend_from_slice(data),
            ChannelMsg::ExitStatus { exit_status } => exit = Some(exit_status),
            ChannelMsg::Close => break,
            _ => {}
        }
    }
    (output, exit)
}

fn sh(script: &str) -> CommandSpawner {
    CommandSpawner::new("/bin/sh", ["-c", script])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shell_output_and_exit_status() {
    let (port, cancel) = start_server(sh("printf hello; exit 3"), false).await;
    let session = connect(port).await;

    let mut channel = session.channel_open_session().await.unwrap();
    channel
        .request_pty(true, "xterm-256color", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel.request_shell(true).await.unwrap();

    let (output, exit) = timeout(TEST_TIMEOUT, drain(&mut channel)).await.unwrap();
    assert!(String::from_utf8_lossy(&output).contains("hello"));
    assert_eq!(exit, Some(3));

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shell_echoes_input() {
    let (port, cancel) = start_server(sh("read line; printf \"got:%s\" \"$line\""), false).await;
    let session = connect(port).await;

    let mut channel = session.channel_open_session().await.unwrap();
    channel
        .request_pty(true, "xterm", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel.request_shell(true).await.unwrap();
    channel.data(&b"burrow\n"[..]).await.unwrap();

    let (output, exit) = timeout(TEST_TIMEOUT, drain(&mut channel)).await.unwrap();
    assert!(String::from_utf8_lossy(&output).contains("got:burrow"));
    assert_eq!(exit, Some(0));

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shell_without_pty_is_refused() {
    let (port, cancel) = start_server(sh("true"), false).await;
    let session = connect(port).await;

    let mut channel = session.channel_open_session().await.unwrap();
    channel.request_shell(true).await.unwrap();

    let (output, exit) = timeout(TEST_TIMEOUT, drain(&mut channel)).await.unwrap();
    assert_eq!(output, NO_PTY_MESSAGE);
    assert_eq!(exit, Some(1));

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sftp_subsystem_writes_files() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("upload.txt");

    let (port, cancel) = start_server(sh("true"), true).await;
    let session = connect(port).await;

    let channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "sftp").await.unwrap();
    let sftp = timeout(TEST_TIMEOUT, SftpSession::new(channel.into_stream()))
        .await
        .unwrap()
        .unwrap();

    let mut file = sftp.create(target.to_string_lossy()).await.unwrap();
    file.write_all(b"via sftp").await.unwrap();
    file.shutdown().await.unwrap();

    let names: Vec<String> = sftp
        .read_dir(dir.path().to_string_lossy())
        .await
        .unwrap()
        .map(|entry| entry.file_name())
        .collect();
    assert!(names.contains(&"upload.txt".to_string()));
    assert_eq!(std::fs::read(&target).unwrap(), b"via sftp");

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sftp_refused_when_disabled() {
    let (port, cancel) = start_server(sh("true"), false).await;
    let session = connect(port).await;

    let mut channel = session.channel_open_session().await.unwrap();
    channel.request_subsystem(true, "sftp").await.unwrap();

    let reply = timeout(TEST_TIMEOUT, channel.wait()).await.unwrap();
    assert!(matches!(reply, Some(ChannelMsg::Failure)));

    // The refused channel is closed rather than left dangling
    loop {
        match timeout(TEST_TIMEOUT, channel.wait()).await.unwrap() {
            Some(ChannelMsg::Close) | None => break,
            Some(ChannelMsg::Data { .. }) => panic!("refused channel carried data"),
            Some(_) => {}
        }
    }

    cancel.cancel();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_bind_conflict_is_an_error() {
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = holder.local_addr().unwrap().port();

    let server = SessionServer::new(Arc::new(sh("true")), false).unwrap();
    let err = server.bind(port).await.unwrap_err();
    assert!(err.to_string().contains(&port.to_string()));
}
