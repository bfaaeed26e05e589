//! control-port entry point: remote-control command and debug ports.
//!
//! # Usage
//!
//! ```text
//! control-port [--config PATH] [--log-level LEVEL] serve [OPTIONS]
//! control-port [--config PATH] [--log-level LEVEL] send --addr HOST:PORT [--retry-secs N] REQUEST
//! ```
//!
//! `serve` runs the command port (and the debug port when configured) until
//! Ctrl+C.  `send` is a one-shot client for scripts and smoke tests:
//!
//! ```text
//! $ control-port send --addr 127.0.0.1:20000 ping
//! pong
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                   | Overrides            |
//! |----------------------------|----------------------|
//! | `CONTROL_PORT_CONFIG`      | `--config`           |
//! | `CONTROL_PORT_LOG_LEVEL`   | `--log-level`        |
//! | `CONTROL_PORT_BIND`        | `serve --bind`       |
//! | `CONTROL_PORT_COMMAND`     | `serve --command-port` |
//! | `CONTROL_PORT_DEBUG`       | `serve --debug-port` |
//!
//! `RUST_LOG`, when set, takes precedence over every log-level setting.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Handle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use control_port::domain::AppConfig;
use control_port::infrastructure::{load_config, send_request, ControlPorts};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Remote-control command and debug ports.
#[derive(Debug, Parser)]
#[command(
    name = "control-port",
    about = "Line-based TCP command and debug ports for the remote-control server",
    version
)]
struct Cli {
    /// Path to the TOML config file.  A missing file means defaults.
    #[arg(
        long,
        global = true,
        default_value = "control-port.toml",
        env = "CONTROL_PORT_CONFIG"
    )]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is unset (overrides `log_level`).
    #[arg(long, global = true, env = "CONTROL_PORT_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the command port and, when enabled, the debug port.
    Serve(ServeArgs),
    /// Send one request and print the reply.
    Send(SendArgs),
}

#[derive(Debug, Args)]
struct ServeArgs {
    /// IP address both ports bind to.
    #[arg(long, env = "CONTROL_PORT_BIND")]
    bind: Option<String>,

    /// Command port.
    #[arg(long, env = "CONTROL_PORT_COMMAND")]
    command_port: Option<u16>,

    /// Debug port; 0 disables it.
    #[arg(long, env = "CONTROL_PORT_DEBUG")]
    debug_port: Option<u16>,

    /// Idle timeout in seconds for both ports.
    #[arg(long)]
    idle_timeout: Option<u64>,
}

#[derive(Debug, Args)]
struct SendArgs {
    /// Server address, e.g. `127.0.0.1:20000`.
    #[arg(long)]
    addr: SocketAddr,

    /// Keep retrying the connection for this many seconds.
    #[arg(long, default_value_t = 0)]
    retry_secs: u64,

    /// Read and discard a greeting line before sending.
    #[arg(long)]
    greeting: bool,

    /// The request line to send.
    request: String,
}

impl ServeArgs {
    /// Applies command-line overrides on top of the file configuration.
    fn apply(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(port) = self.command_port {
            config.command_port.port = port;
        }
        if let Some(port) = self.debug_port {
            config.debug_port.port = port;
        }
        if let Some(secs) = self.idle_timeout {
            config.command_port.idle_timeout_secs = secs;
            config.debug_port.idle_timeout_secs = secs;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }

    // RUST_LOG wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    match cli.command {
        Command::Serve(args) => {
            args.apply(&mut config);
            serve(config).await
        }
        Command::Send(args) => send(args).await,
    }
}

async fn serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        "control-port starting: bind={}, command port={}, debug port={}",
        config.bind_address, config.command_port.port, config.debug_port.port
    );

    let ports = ControlPorts::start(&Handle::current(), &config)?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("received Ctrl+C; shutting down");

    ports.stop().await
}

async fn send(args: SendArgs) -> anyhow::Result<()> {
    let reply = send_request(
        args.addr,
        Duration::from_secs(args.retry_secs),
        &args.request,
        args.greeting,
    )
    .await?;
    match reply {
        Some(line) => {
            println!("{line}");
            Ok(())
        }
        None => anyhow::bail!("{} closed the connection without replying", args.addr),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
