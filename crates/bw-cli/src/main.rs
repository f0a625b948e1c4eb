//! burrow CLI
//!
//! Single binary for both ends of a burrow:
//! - `host` exposes this machine's shell through the relay
//! - `connect` reaches a host by its identifier
//! - `sh` is the hidden re-exec target for PTY shells

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burrow::commands;
use burrow::output::print_error;
use burrow_core::config::ConfigOverrides;

#[derive(Parser)]
#[command(name = "burrow")]
#[command(author, version, about = "Remote shell and file transfer through a relay tunnel")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(flatten)]
    session: SessionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct SessionArgs {
    /// Relay server address
    #[arg(long, global = true, value_name = "ADDR")]
    srv: Option<String>,

    /// Relay credential (user:pass)
    #[arg(long, global = true)]
    auth: Option<String>,

    /// HTTP CONNECT proxy URL
    #[arg(long, global = true, value_name = "URL")]
    proxy: Option<String>,

    /// Id of the host to connect to, or a file holding it
    #[arg(long = "host-id", visible_alias = "id", global = true, value_name = "ID")]
    host_id: Option<String>,

    /// Time to wait between tunnel attempts [default: 10s]
    #[arg(long, global = true, value_name = "DURATION", value_parser = parse_duration)]
    retry: Option<Duration>,

    /// Use SFTP instead of an interactive shell
    #[arg(long, global = true)]
    sftp: bool,
}

impl From<SessionArgs> for ConfigOverrides {
    fn from(args: SessionArgs) -> Self {
        Self {
            server: args.srv,
            auth: args.auth,
            proxy: args.proxy,
            host_id: args.host_id,
            retry: args.retry,
            sftp: args.sftp,
        }
    }
}

fn parse_duration(raw: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(raw)
}

#[derive(Subcommand)]
enum Commands {
    /// Open tunnel and host ssh server
    Host,

    /// Open tunnel and connect to ssh host
    Connect,

    /// Run the login shell (used for PTY sessions)
    #[command(hide = true)]
    Sh,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Show config file path
    Path,
}

fn init_logging(quiet: bool, verbose: u8) {
    let log_level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Cancel `cancel` on Ctrl+C or SIGTERM
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        cancel.cancel();
    });
}

#[cfg(unix)]
fn run_shell() -> Result<i32> {
    let err = burrow_host::pty::exec_login_shell();
    Err(anyhow::Error::new(err).context("exec login shell"))
}

#[cfg(not(unix))]
fn run_shell() -> Result<i32> {
    let status = std::process::Command::new(burrow_host::pty::login_shell()).status()?;
    Ok(status.code().unwrap_or(1))
}

async fn run(cli: Cli) -> Result<i32> {
    let config_path = cli.config.as_deref();
    let overrides = ConfigOverrides::from(cli.session);

    match cli.command {
        Commands::Sh => run_shell(),
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => commands::config_show(overrides, config_path)?,
                ConfigAction::Path => commands::config_path(config_path),
            }
            Ok(0)
        }
        Commands::Host => {
            let config = commands::resolve_config(overrides, config_path)?;
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            commands::host_command(config, cancel).await?;
            Ok(0)
        }
        Commands::Connect => {
            let config = commands::resolve_config(overrides, config_path)?;
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            commands::connect_command(config, cancel).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            print_error(&format!("{:#}", e));
            1
        }
    };
    std::process::exit(code);
}
