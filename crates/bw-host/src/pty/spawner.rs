//! Shell spawning strategies

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use portable_pty::CommandBuilder;

use burrow_core::error::SessionError;
use burrow_core::types::TerminalSize;

use super::shell::PtyShell;

/// Shell used when `$SHELL` is unset
pub const FALLBACK_SHELL: &str = "/bin/sh";

/// Hidden subcommand the re-executed binary runs
pub const SHELL_SUBCOMMAND: &str = "sh";

/// What the client asked for in its `pty-req`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    pub term: String,
    pub size: TerminalSize,
}

/// Starts the interactive process for a shell request
pub trait ShellSpawner: Send + Sync {
    fn spawn(&self, request: &PtyRequest) -> Result<PtyShell, SessionError>;
}

/// Re-executes the current binary with the hidden shell subcommand.
#[derive(Debug, Clone)]
pub struct ReexecSpawner {
    exe: PathBuf,
}

impl ReexecSpawner {
    /// Spawner for the running executable
    pub fn current() -> Result<Self, SessionError> {
        let exe = std::env::current_exe()
            .map_err(|e| SessionError::Spawn(format!("locate executable: {}", e)))?;
        Ok(Self { exe })
    }

    pub fn new(exe: impl Into<PathBuf>) -> Self {
        Self { exe: exe.into() }
    }
}

impl ShellSpawner for ReexecSpawner {
    fn spawn(&self, request: &PtyRequest) -> Result<PtyShell, SessionError> {
        let mut cmd = CommandBuilder::new(&self.exe);
        cmd.arg(SHELL_SUBCOMMAND);

        cmd.env_clear();
        let exe_dir = self.exe.parent().unwrap_or_else(|| Path::new("/"));
        for (key, value) in shell_env(std::env::vars_os(), exe_dir, &request.term) {
            cmd.env(key, value);
        }
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        PtyShell::spawn(cmd, request.size)
    }
}

/// Runs a fixed program, with `TERM` set from the request.
#[derive(Debug, Clone)]
pub struct CommandSpawner {
    program: OsString,
    args: Vec<OsString>,
}

impl CommandSpawner {
    pub fn new<I, S>(program: impl AsRef<OsStr>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Self {
            program: program.as_ref().to_owned(),
            args: args.into_iter().map(|a| a.as_ref().to_owned()).collect(),
        }
    }
}

impl ShellSpawner for CommandSpawner {
    fn spawn(&self, request: &PtyRequest) -> Result<PtyShell, SessionError> {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        cmd.env("TERM", &request.term);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }
        PtyShell::spawn(cmd, request.size)
    }
}

/// Environment for the re-executed shell: everything inherited, with the
/// executable's directory in front of `PATH` and `TERM` from the request.
pub fn shell_env<I>(inherited: I, exe_dir: &Path, term: &str) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    let mut existing_path = None;
    let mut env: Vec<(OsString, OsString)> = Vec::new();
    for (k, v) in inherited {
        if k == "PATH" {
            existing_path = Some(v);
        } else if k != "TERM" {
            env.push((k, v));
        }
    }

    let mut path = exe_dir.as_os_str().to_owned();
    if let Some(existing) = existing_path.filter(|p| !p.is_empty()) {
        path.push(":");
        path.push(existing);
    }

    env.push(("PATH".into(), path));
    env.push(("TERM".into(), term.into()));
    env
}

/// The user's login shell: `$SHELL`, falling back to `/bin/sh`.
pub fn login_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_SHELL.to_string())
}

/// `argv[0]` marking `shell` as a login shell: its base name with a
/// leading `-`.
pub fn login_argv0(shell: &str) -> String {
    let name = Path::new(shell)
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| shell.into());
    format!("-{}", name)
}

/// Replace the current process with the login shell.
///
/// Only returns on failure.
#[cfg(unix)]
pub fn exec_login_shell() -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let shell = login_shell();
    let argv0 = login_argv0(&shell);
    tracing::debug!("Executing login shell {} as {}", shell, argv0);
    std::process::Command::new(&shell).arg0(argv0).exec()
}
