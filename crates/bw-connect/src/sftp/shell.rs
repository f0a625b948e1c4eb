//! Interactive SFTP command shell
//!
//! Keeps the remote working directory and runs file-management commands
//! against a [`RemoteFs`]. Per-command failures are printed and the loop
//! continues; only a failed prompt read ends it with an error.

use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};

use glob::Pattern;

use super::path;
use super::progress::{copy_with_progress, transfer_bar};
use super::prompt::{Input, Prompt};
use super::remote::RemoteFs;
use crate::error::ShellError;

pub const PROMPT: &str = "sftp> ";

const HELP: &str = "\
ls [dir]            list remote directory
lls [dir]           list local directory
cd path             change remote directory
lcd path            change local directory
pwd                 print remote directory
lpwd                print local directory
put local remote    upload a file
get remote local    download a file
rm pattern          remove matching remote entries
mkdir dir           create a remote directory
help, ?             show this help
exit                leave the shell";

/// SFTP shell state bound to one remote filesystem
pub struct SftpShell<R, W> {
    fs: R,
    cwd: String,
    out: W,
    show_progress: bool,
}

impl<R: RemoteFs> SftpShell<R, std::io::Stdout> {
    /// Shell printing to stdout with progress bars on stderr
    pub async fn new(fs: R) -> Result<Self, ShellError> {
        Self::with_output(fs, std::io::stdout(), true).await
    }
}

impl<R: RemoteFs, W: Write> SftpShell<R, W> {
    /// Start in the remote side's working directory.
    pub async fn with_output(fs: R, out: W, show_progress: bool) -> Result<Self, ShellError> {
        let cwd = fs.canonicalize(".").await?;
        tracing::debug!("Remote working directory: {}", cwd);
        Ok(Self {
            fs,
            cwd,
            out,
            show_progress,
        })
    }

    /// Current remote working directory
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    pub fn into_inner(self) -> (R, W) {
        (self.fs, self.out)
    }

    /// Read and run commands until `exit` or end of input.
    pub async fn run<P: Prompt>(&mut self, prompt: &mut P) -> Result<(), ShellError> {
        loop {
            let line = match prompt.read_line(PROMPT)? {
                Input::Line(line) => line,
                Input::Interrupted => continue,
                Input::Eof => return Ok(()),
            };

            let words = match shell_words::split(&line) {
                Ok(words) => words,
                Err(e) => {
                    self.say(e);
                    continue;
                }
            };

            let Some((command, args)) = words.split_first() else {
                continue;
            };

            if self.execute(command, args).await {
                return Ok(());
            }
        }
    }

    /// Run one command. Returns `true` when the shell should exit.
    pub async fn execute(&mut self, command: &str, args: &[String]) -> bool {
        tracing::debug!("sftp command {} {:?}", command, args);
        match command {
            "ls" => self.ls(args).await,
            "lls" => self.lls(args),
            "lcd" => self.lcd(args),
            "cd" => self.cd(args).await,
            "pwd" => {
                let cwd = self.cwd.clone();
                self.say(cwd);
            }
            "lpwd" => self.lpwd(),
            "put" => self.put(args).await,
            "get" => self.get(args).await,
            "rm" => self.rm(args).await,
            "mkdir" => self.mkdir(args).await,
            "help" | "?" => self.say(HELP),
            "exit" => return true,
            other => self.say(format!("unknown command: {}", other)),
        }
        false
    }

    fn say(&mut self, msg: impl Display) {
        let _ = writeln!(self.out, "{}", msg);
    }

    /// Absolute paths are kept; relative ones are joined onto the working
    /// directory and canonicalized remotely, falling back to the joined
    /// path when that fails.
    pub async fn remote_path(&mut self, arg: &str) -> String {
        if path::is_absolute(arg) {
            return arg.to_string();
        }

        let joined = path::join(&self.cwd, arg);
        match self.fs.canonicalize(&joined).await {
            Ok(canonical) => canonical,
            Err(e) => {
                self.say(e);
                joined
            }
        }
    }

    async fn ls(&mut self, args: &[String]) {
        let dir = match args.first() {
            Some(arg) => self.remote_path(arg).await,
            None => self.cwd.clone(),
        };

        match self.fs.read_dir(&dir).await {
            Ok(mut entries) => {
                entries.sort_by(|a, b| a.name.cmp(&b.name));
                for entry in entries {
                    let suffix = if entry.is_dir { "/" } else { "" };
                    self.say(format!("{}{}", entry.name, suffix));
                }
            }
            Err(e) => self.say(e),
        }
    }

    fn lls(&mut self, args: &[String]) {
        let dir = args.first().map(String::as_str).unwrap_or(".");

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => return self.say(e),
        };

        let mut lines: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let shown = if dir == "." {
                    name
                } else {
                    Path::new(dir).join(name).to_string_lossy().into_owned()
                };
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    format!("{}/", shown)
                } else {
                    shown
                }
            })
            .collect();
        lines.sort();

        for line in lines {
            self.say(line);
        }
    }

    fn lcd(&mut self, args: &[String]) {
        let [dir] = args else {
            return self.say("only one argument is accepted");
        };
        if let Err(e) = std::env::set_current_dir(dir) {
            self.say(e);
        }
        self.lpwd();
    }

    async fn cd(&mut self, args: &[String]) {
        let [arg] = args else {
            return self.say("only one argument is accepted");
        };

        let target = self.remote_path(arg).await;
        match self.fs.stat(&target).await {
            Ok(meta) if meta.is_dir => {
                tracing::debug!("Remote working directory now {}", target);
                self.cwd = target;
            }
            Ok(_) => self.say("cannot change directory"),
            Err(e) => self.say(e),
        }
    }

    fn lpwd(&mut self) {
        match std::env::current_dir() {
            Ok(dir) => self.say(dir.display()),
            Err(e) => self.say(e),
        }
    }

    async fn put(&mut self, args: &[String]) {
        let [local, remote] = args else {
            return self.say("usage: put path-to-local-source path-to-remote-destination");
        };
        if let Err(e) = self.upload(local, remote).await {
            self.say(e);
        }
    }

    async fn upload(&mut self, local: &str, remote: &str) -> Result<(), ShellError> {
        let src_path = local_absolute(local)?;
        let mut src = tokio::fs::File::open(&src_path).await?;
        let size = src.metadata().await?.len();

        let dst_path = self.remote_path(remote).await;
        let mut dst = self.fs.create(&dst_path).await?;

        let bar = transfer_bar("uploading", size, self.show_progress);
        let copied = copy_with_progress(&mut src, &mut dst, &bar).await?;
        tracing::info!("Uploaded {} bytes to {}", copied, dst_path);
        Ok(())
    }

    async fn get(&mut self, args: &[String]) {
        let [remote, local] = args else {
            return self.say("usage: get path-to-remote-source path-to-local-destination");
        };
        if let Err(e) = self.download(remote, local).await {
            self.say(e);
        }
    }

    async fn download(&mut self, remote: &str, local: &str) -> Result<(), ShellError> {
        let src_path = self.remote_path(remote).await;
        let size = self.fs.stat(&src_path).await?.size;
        let mut src = self.fs.open(&src_path).await?;

        let dst_path = local_absolute(local)?;
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o755);
        let mut dst = options.open(&dst_path).await?;

        let bar = transfer_bar("downloading", size, self.show_progress);
        let copied = copy_with_progress(&mut src, &mut dst, &bar).await?;
        tracing::info!("Downloaded {} bytes to {}", copied, dst_path.display());
        Ok(())
    }

    async fn rm(&mut self, args: &[String]) {
        let [arg] = args else {
            return self.say("usage: rm pattern");
        };

        let target = self.remote_path(arg).await;
        let (dir, base) = path::split(&target);

        let pattern = match Pattern::new(&base) {
            Ok(pattern) => pattern,
            Err(e) => return self.say(e),
        };

        let entries = match self.fs.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => return self.say(e),
        };

        for entry in entries.into_iter().filter(|e| pattern.matches(&e.name)) {
            let entry_path = path::join(&dir, &entry.name);

            let meta = match self.fs.stat(&entry_path).await {
                Ok(meta) => meta,
                Err(e) => {
                    self.say(format!("error: {}", e));
                    continue;
                }
            };

            let removed = if meta.is_dir {
                self.remove_tree(&entry_path).await
            } else {
                self.fs.remove_file(&entry_path).await
            };
            if let Err(e) = removed {
                self.say(format!("error: {}", e));
            }
        }
    }

    /// Remove a directory and everything below it.
    async fn remove_tree(&self, root: &str) -> Result<(), ShellError> {
        let mut pending = vec![root.to_string()];
        let mut dirs = Vec::new();

        while let Some(dir) = pending.pop() {
            for entry in self.fs.read_dir(&dir).await? {
                let child = path::join(&dir, &entry.name);
                if entry.is_dir {
                    pending.push(child);
                } else {
                    self.fs.remove_file(&child).await?;
                }
            }
            dirs.push(dir);
        }

        // Parents were discovered before their children
        for dir in dirs.iter().rev() {
            self.fs.remove_dir(dir).await?;
        }
        Ok(())
    }

    async fn mkdir(&mut self, args: &[String]) {
        let [arg] = args else {
            return self.say("usage: mkdir dir");
        };
        let target = self.remote_path(arg).await;
        if let Err(e) = self.fs.create_dir(&target).await {
            self.say(e);
        }
    }
}

fn local_absolute(path: &str) -> std::io::Result<PathBuf> {
    let path = Path::new(path);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
