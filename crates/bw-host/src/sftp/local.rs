//! SFTP server backed by the local filesystem
//!
//! Relative paths resolve against the process working directory.

use std::collections::HashMap;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle, Name, OpenFlags, Status, StatusCode, Version,
};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Most bytes returned by one `read`
const MAX_READ_LEN: u32 = 256 * 1024;

enum OpenHandle {
    File(fs::File),
    Dir { path: PathBuf, listed: bool },
}

/// Per-subsystem SFTP state
#[derive(Default)]
pub struct LocalFsHandler {
    handles: HashMap<String, OpenHandle>,
    next_handle: u64,
}

impl LocalFsHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, handle: OpenHandle) -> String {
        self.next_handle += 1;
        let key = self.next_handle.to_string();
        self.handles.insert(key.clone(), handle);
        key
    }

    fn file(&mut self, handle: &str) -> Result<&mut fs::File, StatusCode> {
        match self.handles.get_mut(handle) {
            Some(OpenHandle::File(file)) => Ok(file),
            _ => Err(StatusCode::Failure),
        }
    }
}

fn status_of(e: std::io::Error) -> StatusCode {
    match e.kind() {
        ErrorKind::NotFound => StatusCode::NoSuchFile,
        ErrorKind::PermissionDenied => StatusCode::PermissionDenied,
        _ => StatusCode::Failure,
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".to_string(),
        language_tag: "en-US".to_string(),
    }
}

/// Wire attributes for local metadata
pub fn attributes(meta: &std::fs::Metadata) -> FileAttributes {
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32);
    let atime = meta
        .accessed()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as u32);

    #[cfg(unix)]
    let (uid, gid, permissions) = {
        use std::os::unix::fs::MetadataExt;
        (Some(meta.uid()), Some(meta.gid()), Some(meta.mode()))
    };
    #[cfg(not(unix))]
    let (uid, gid, permissions) = {
        let kind = if meta.is_dir() { 0o040000 } else { 0o100000 };
        let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };
        (None, None, Some(kind | mode))
    };

    FileAttributes {
        size: Some(meta.len()),
        uid,
        gid,
        permissions,
        atime,
        mtime,
        ..Default::default()
    }
}

/// `ls -l` style line for a directory entry
fn longname(name: &str, meta: &std::fs::Metadata) -> String {
    let kind = if meta.is_dir() {
        'd'
    } else if meta.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };

    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode()
    };
    #[cfg(not(unix))]
    let mode = if meta.permissions().readonly() { 0o444 } else { 0o644 };

    let mut perms = String::with_capacity(9);
    for shift in [6u32, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        perms.push(if bits & 4 != 0 { 'r' } else { '-' });
        perms.push(if bits & 2 != 0 { 'w' } else { '-' });
        perms.push(if bits & 1 != 0 { 'x' } else { '-' });
    }

    format!("{}{} {:>12} {}", kind, perms, meta.len(), name)
}

/// Normalize `.` and `..` without touching the filesystem.
fn lexical_absolute(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

#[async_trait]
impl russh_sftp::server::Handler for LocalFsHandler {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        tracing::debug!("SFTP client version {}", version);
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        attrs: FileAttributes,
    ) -> Result<Handle, Self::Error> {
        let mut options = fs::OpenOptions::new();
        options
            .read(pflags.contains(OpenFlags::READ))
            .write(pflags.contains(OpenFlags::WRITE) || pflags.contains(OpenFlags::APPEND))
            .append(pflags.contains(OpenFlags::APPEND))
            .truncate(pflags.contains(OpenFlags::TRUNCATE));

        if pflags.contains(OpenFlags::CREATE) {
            if pflags.contains(OpenFlags::EXCLUDE) {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }

        #[cfg(unix)]
        if let Some(mode) = attrs.permissions {
            options.mode(mode & 0o7777);
        }
        #[cfg(not(unix))]
        let _ = attrs;

        let file = options.open(&filename).await.map_err(status_of)?;
        tracing::debug!("SFTP open {} ({:?})", filename, pflags);

        Ok(Handle {
            id,
            handle: self.insert(OpenHandle::File(file)),
        })
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        match self.handles.remove(&handle) {
            Some(OpenHandle::File(mut file)) => {
                file.flush().await.map_err(status_of)?;
                Ok(ok(id))
            }
            Some(OpenHandle::Dir { .. }) => Ok(ok(id)),
            None => Err(StatusCode::Failure),
        }
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let file = self.file(&handle)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(status_of)?;

        let mut data = vec![0u8; len.min(MAX_READ_LEN) as usize];
        let n = file.read(&mut data).await.map_err(status_of)?;
        if n == 0 {
            return Err(StatusCode::Eof);
        }
        data.truncate(n);

        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let file = self.file(&handle)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(status_of)?;
        file.write_all(&data).await.map_err(status_of)?;
        Ok(ok(id))
    }

    async fn lstat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let meta = fs::symlink_metadata(&path).await.map_err(status_of)?;
        Ok(Attrs {
            id,
            attrs: attributes(&meta),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let meta = match self.handles.get(&handle) {
            Some(OpenHandle::File(file)) => file.metadata().await.map_err(status_of)?,
            Some(OpenHandle::Dir { path, .. }) => fs::metadata(path).await.map_err(status_of)?,
            None => return Err(StatusCode::Failure),
        };
        Ok(Attrs {
            id,
            attrs: attributes(&meta),
        })
    }

    async fn setstat(
        &mut self,
        id: u32,
        path: String,
        attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        #[cfg(unix)]
        if let Some(mode) = attrs.permissions {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, std::fs::Permissions::from_mode(mode & 0o7777))
                .await
                .map_err(status_of)?;
        }
        if let Some(size) = attrs.size {
            let file = fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .await
                .map_err(status_of)?;
            file.set_len(size).await.map_err(status_of)?;
        }
        Ok(ok(id))
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<Handle, Self::Error> {
        let meta = fs::metadata(&path).await.map_err(status_of)?;
        if !meta.is_dir() {
            return Err(StatusCode::NoSuchFile);
        }

        Ok(Handle {
            id,
            handle: self.insert(OpenHandle::Dir {
                path: PathBuf::from(path),
                listed: false,
            }),
        })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let path = match self.handles.get_mut(&handle) {
            Some(OpenHandle::Dir { listed: true, .. }) => return Err(StatusCode::Eof),
            Some(OpenHandle::Dir { path, listed }) => {
                *listed = true;
                path.clone()
            }
            _ => return Err(StatusCode::Failure),
        };

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&path).await.map_err(status_of)?;
        while let Some(entry) = entries.next_entry().await.map_err(status_of)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = match fs::symlink_metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    tracing::debug!("Skipping {}: {}", name, e);
                    continue;
                }
            };
            files.push(File {
                longname: longname(&name, &meta),
                attrs: attributes(&meta),
                filename: name,
            });
        }

        Ok(Name { id, files })
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        fs::remove_file(&filename).await.map_err(status_of)?;
        Ok(ok(id))
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        fs::create_dir(&path).await.map_err(status_of)?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        fs::remove_dir(&path).await.map_err(status_of)?;
        Ok(ok(id))
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let requested = if path.is_empty() { "." } else { path.as_str() };
        let resolved = match fs::canonicalize(requested).await {
            Ok(resolved) => resolved,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                lexical_absolute(Path::new(requested)).map_err(status_of)?
            }
            Err(e) => return Err(status_of(e)),
        };

        let name = resolved.to_string_lossy().into_owned();
        Ok(Name {
            id,
            files: vec![File {
                filename: name.clone(),
                longname: name,
                attrs: FileAttributes::default(),
            }],
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let meta = fs::metadata(&path).await.map_err(status_of)?;
        Ok(Attrs {
            id,
            attrs: attributes(&meta),
        })
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        fs::rename(&oldpath, &newpath).await.map_err(status_of)?;
        Ok(ok(id))
    }

    async fn readlink(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        let target = fs::read_link(&path).await.map_err(status_of)?;
        let name = target.to_string_lossy().into_owned();
        Ok(Name {
            id,
            files: vec![File {
                filename: name.clone(),
                longname: name,
                attrs: FileAttributes::default(),
            }],
        })
    }

    async fn symlink(
        &mut self,
        id: u32,
        linkpath: String,
        targetpath: String,
    ) -> Result<Status, Self::Error> {
        #[cfg(unix)]
        {
            fs::symlink(&targetpath, &linkpath).await.map_err(status_of)?;
            Ok(ok(id))
        }
        #[cfg(not(unix))]
        {
            let _ = (id, linkpath, targetpath);
            Err(StatusCode::OpUnsupported)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh_sftp::server::Handler as _;

    fn path_str(p: &Path) -> String {
        p.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file = path_str(&dir.path().join("note.txt"));
        let mut sftp = LocalFsHandler::new();

        let handle = sftp
            .open(
                1,
                file.clone(),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                FileAttributes::default(),
            )
            .await
            .unwrap()
            .handle;
        sftp.write(2, handle.clone(), 0, b"hello world".to_vec())
            .await
            .unwrap();
        sftp.close(3, handle).await.unwrap();

        let handle = sftp
            .open(4, file, OpenFlags::READ, FileAttributes::default())
            .await
            .unwrap()
            .handle;
        let data = sftp.read(5, handle.clone(), 6, 1024).await.unwrap();
        assert_eq!(data.data, b"world");
        assert!(matches!(
            sftp.read(6, handle.clone(), 11, 1024).await,
            Err(StatusCode::Eof)
        ));
        sftp.close(7, handle).await.unwrap();
    }

    #[tokio::test]
    async fn test_exclusive_create_fails_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("exists");
        std::fs::write(&file, b"x").unwrap();

        let mut sftp = LocalFsHandler::new();
        let result = sftp
            .open(
                1,
                path_str(&file),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::EXCLUDE,
                FileAttributes::default(),
            )
            .await;
        assert!(matches!(result, Err(StatusCode::Failure)));
    }

    #[tokio::test]
    async fn test_readdir_then_eof() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), b"1").unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();

        let mut sftp = LocalFsHandler::new();
        let handle = sftp.opendir(1, path_str(dir.path())).await.unwrap().handle;

        let listing = sftp.readdir(2, handle.clone()).await.unwrap();
        let mut names: Vec<_> = listing.files.iter().map(|f| f.filename.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["a.log", "logs"]);

        let logs = listing.files.iter().find(|f| f.filename == "logs").unwrap();
        assert!(logs.longname.starts_with('d'));

        assert!(matches!(
            sftp.readdir(3, handle).await,
            Err(StatusCode::Eof)
        ));
    }

    #[tokio::test]
    async fn test_stat_missing_is_no_such_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut sftp = LocalFsHandler::new();
        let result = sftp.stat(1, path_str(&dir.path().join("missing"))).await;
        assert!(matches!(result, Err(StatusCode::NoSuchFile)));
    }

    #[tokio::test]
    async fn test_mkdir_rmdir_remove_rename() {
        let dir = tempfile::tempdir().unwrap();
        let sub = path_str(&dir.path().join("sub"));
        let mut sftp = LocalFsHandler::new();

        sftp.mkdir(1, sub.clone(), FileAttributes::default())
            .await
            .unwrap();
        assert!(dir.path().join("sub").is_dir());
        sftp.rmdir(2, sub).await.unwrap();
        assert!(!dir.path().join("sub").exists());

        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, b"x").unwrap();
        sftp.rename(3, path_str(&a), path_str(&b)).await.unwrap();
        assert!(b.exists() && !a.exists());
        sftp.remove(4, path_str(&b)).await.unwrap();
        assert!(!b.exists());
    }

    #[tokio::test]
    async fn test_realpath_normalizes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("x")).unwrap();
        let canonical = std::fs::canonicalize(dir.path()).unwrap();

        let mut sftp = LocalFsHandler::new();
        let name = sftp
            .realpath(1, path_str(&dir.path().join("x/..")))
            .await
            .unwrap();
        assert_eq!(name.files[0].filename, path_str(&canonical));
    }

    #[test]
    fn test_lexical_absolute() {
        assert_eq!(
            lexical_absolute(Path::new("/a/b/../c/./d")).unwrap(),
            PathBuf::from("/a/c/d")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_setstat_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("script");
        std::fs::write(&file, b"#!/bin/sh").unwrap();

        let mut sftp = LocalFsHandler::new();
        let attrs = FileAttributes {
            permissions: Some(0o750),
            ..Default::default()
        };
        sftp.setstat(1, path_str(&file), attrs).await.unwrap();

        let mode = std::fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }
}
