//! PTY-attached shell processes
//!
//! Wraps a portable-pty pair and the child running on its slave side.

use std::io::{Read, Write};

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};

use burrow_core::error::SessionError;
use burrow_core::types::TerminalSize;

fn pty_size(size: TerminalSize) -> PtySize {
    PtySize {
        rows: size.rows,
        cols: size.cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// A child process attached to the slave side of a fresh PTY
pub struct PtyShell {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    pid: Option<u32>,
}

impl PtyShell {
    /// Open a PTY of `size` and start `cmd` on it.
    pub fn spawn(cmd: CommandBuilder, size: TerminalSize) -> Result<Self, SessionError> {
        tracing::debug!("Opening PTY {}x{}", size.cols, size.rows);

        let pair = native_pty_system()
            .openpty(pty_size(size))
            .map_err(|e| SessionError::PtyAllocation(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        // Only the child keeps the slave open, so reads hit EOF when it exits
        drop(pair.slave);

        let pid = child.process_id();
        tracing::debug!("Spawned shell process with PID: {:?}", pid);

        Ok(Self {
            master: pair.master,
            child,
            pid,
        })
    }

    /// Process id of the child, when the platform reports one
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Split into the independently owned parts the session tasks need.
    pub fn into_parts(self) -> Result<PtyParts, SessionError> {
        let reader = self
            .master
            .try_clone_reader()
            .map_err(|e| SessionError::PtyAllocation(format!("clone reader: {}", e)))?;
        let writer = self
            .master
            .take_writer()
            .map_err(|e| SessionError::PtyAllocation(format!("take writer: {}", e)))?;

        Ok(PtyParts {
            reader,
            writer,
            resizer: PtyResizer {
                master: self.master,
            },
            child: self.child,
        })
    }
}

/// The pieces of a [`PtyShell`] after splitting
pub struct PtyParts {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub resizer: PtyResizer,
    pub child: Box<dyn Child + Send + Sync>,
}

/// Owns the PTY master; dropping it releases the PTY.
pub struct PtyResizer {
    master: Box<dyn MasterPty + Send>,
}

impl PtyResizer {
    pub fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        tracing::debug!("Resizing PTY to {}x{}", size.cols, size.rows);
        self.master
            .resize(pty_size(size))
            .map_err(|e| SessionError::PtyAllocation(format!("resize: {}", e)))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandBuilder {
        let mut cmd = CommandBuilder::new("/bin/sh");
        cmd.args(["-c", script]);
        cmd
    }

    fn read_all(mut reader: Box<dyn Read + Send>) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match reader.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => out.extend_from_slice(&buf[..n]),
            }
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn test_spawn_reads_output_and_exit_code() {
        let shell = PtyShell::spawn(sh("printf hello; exit 3"), TerminalSize::default()).unwrap();
        assert!(shell.pid().is_some());

        let mut parts = shell.into_parts().unwrap();
        let output = read_all(parts.reader);
        let status = parts.child.wait().unwrap();

        assert!(output.contains("hello"));
        assert_eq!(status.exit_code(), 3);
    }

    #[test]
    fn test_pty_reports_requested_size() {
        let shell = PtyShell::spawn(sh("stty size"), TerminalSize::new(33, 101)).unwrap();
        let mut parts = shell.into_parts().unwrap();
        let output = read_all(parts.reader);
        parts.child.wait().unwrap();

        assert!(output.contains("33 101"));
    }

    #[test]
    fn test_resize() {
        let shell = PtyShell::spawn(sh("sleep 0"), TerminalSize::default()).unwrap();
        let mut parts = shell.into_parts().unwrap();
        parts.resizer.resize(TerminalSize::new(50, 132)).unwrap();
        parts.child.wait().unwrap();
    }
}
