//! Remote filesystem capability used by the SFTP shell

use async_trait::async_trait;
use russh_sftp::client::SftpSession;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ShellError;

/// A directory entry on the remote side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_dir: bool,
}

/// What the shell needs to know about a remote path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub is_dir: bool,
    pub size: u64,
}

pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Remote filesystem operations the SFTP shell is built on
#[async_trait]
pub trait RemoteFs: Send + Sync {
    /// Resolve `path` to a canonical absolute path on the remote side
    async fn canonicalize(&self, path: &str) -> Result<String, ShellError>;

    /// List `path`, without `.` and `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, ShellError>;

    /// Follows symlinks
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, ShellError>;

    async fn open(&self, path: &str) -> Result<RemoteReader, ShellError>;

    /// Create or truncate `path` for writing
    async fn create(&self, path: &str) -> Result<RemoteWriter, ShellError>;

    async fn remove_file(&self, path: &str) -> Result<(), ShellError>;

    /// Remove an empty directory
    async fn remove_dir(&self, path: &str) -> Result<(), ShellError>;

    async fn create_dir(&self, path: &str) -> Result<(), ShellError>;
}

/// [`RemoteFs`] over an SFTP session
pub struct SftpRemote {
    sftp: SftpSession,
}

impl SftpRemote {
    pub fn new(sftp: SftpSession) -> Self {
        Self { sftp }
    }

    /// End the SFTP session
    pub async fn close(&self) -> Result<(), ShellError> {
        self.sftp.close().await.map_err(remote)
    }
}

fn remote(err: impl std::fmt::Display) -> ShellError {
    ShellError::Remote(err.to_string())
}

#[async_trait]
impl RemoteFs for SftpRemote {
    async fn canonicalize(&self, path: &str) -> Result<String, ShellError> {
        self.sftp.canonicalize(path).await.map_err(remote)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, ShellError> {
        let entries = self.sftp.read_dir(path).await.map_err(remote)?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| RemoteEntry {
                is_dir: entry.metadata().is_dir(),
                name: entry.file_name(),
            })
            .collect())
    }

    async fn stat(&self, path: &str) -> Result<RemoteMetadata, ShellError> {
        let meta = self.sftp.metadata(path).await.map_err(remote)?;
        Ok(RemoteMetadata {
            is_dir: meta.is_dir(),
            size: meta.size.unwrap_or(0),
        })
    }

    async fn open(&self, path: &str) -> Result<RemoteReader, ShellError> {
        let file = self.sftp.open(path).await.map_err(remote)?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &str) -> Result<RemoteWriter, ShellError> {
        let file = self.sftp.create(path).await.map_err(remote)?;
        Ok(Box::new(file))
    }

    async fn remove_file(&self, path: &str) -> Result<(), ShellError> {
        self.sftp.remove_file(path).await.map_err(remote)
    }

    async fn remove_dir(&self, path: &str) -> Result<(), ShellError> {
        self.sftp.remove_dir(path).await.map_err(remote)
    }

    async fn create_dir(&self, path: &str) -> Result<(), ShellError> {
        self.sftp.create_dir(path).await.map_err(remote)
    }
}
