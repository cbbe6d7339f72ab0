//! streamgated — runs an application behind the streaming bridge.
//!
//! # Usage
//!
//! ```text
//! streamgated                      # Lambda runtime (default)
//! streamgated lambda
//! streamgated local --port 9000    # hyper server for development
//! streamgated --config streamgate.toml local
//! ```
//!
//! Configuration comes from `--config` (or `STREAMGATE_CONFIG`), then the
//! `STREAMGATE_*` environment overrides.

mod demo;
mod lambda;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use streamgate_bridge::Bridge;
use streamgate_core::{GateConfig, LogConfig, LogFormat};
use streamgate_trigger::HttpTrigger;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "streamgated", about = "streamgate streaming bridge daemon")]
struct Cli {
    /// Path to a streamgate.toml file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve invocations from the Lambda runtime API.
    Lambda,
    /// Serve the bridge over local HTTP for development.
    Local {
        /// Port to listen on (overrides `local.port`).
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.or_else(|| {
        std::env::var_os(streamgate_core::config::ENV_CONFIG_PATH).map(PathBuf::from)
    });
    let config = GateConfig::load(config_path.as_deref()).context("failed to load config")?;

    init_tracing(&config.log);

    let bridge = Bridge::from_config(demo::DemoApp::default(), &config.streaming)
        .context("invalid streaming configuration")?;

    match cli.command.unwrap_or(Command::Lambda) {
        Command::Lambda => {
            info!(routes = bridge.routes().len(), "streamgate starting under the Lambda runtime");
            lambda::run(bridge, config.streaming.channel_capacity).await
        }
        Command::Local { port } => {
            let port = port.unwrap_or(config.local.port);
            run_local(bridge, port, config.streaming.channel_capacity).await
        }
    }
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match log.format {
        // Lambda adds timestamps and does not render ANSI colors.
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .without_time()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn run_local(bridge: Bridge, port: u16, channel_capacity: usize) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(%addr, "streamgate starting in local mode");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let trigger = HttpTrigger::new(addr, bridge).with_channel_capacity(channel_capacity);
    let server = tokio::spawn(async move { trigger.serve(shutdown_rx).await });

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to install CTRL+C handler")?;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
        _ = shutdown_tx.closed() => {}
    }

    server.await.context("trigger task panicked")??;
    info!("streamgate stopped");
    Ok(())
}
