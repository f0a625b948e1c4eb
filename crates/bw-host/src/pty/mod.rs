//! PTY shells for interactive sessions

mod session;
mod shell;
mod spawner;

pub use session::{start_session, SessionIo};
pub use shell::{PtyParts, PtyResizer, PtyShell};
pub use spawner::{
    login_shell, shell_env, CommandSpawner, PtyRequest, ReexecSpawner, ShellSpawner,
    FALLBACK_SHELL, SHELL_SUBCOMMAND,
};

#[cfg(unix)]
pub use spawner::exec_login_shell;
