//! CLI Entry Point for the multimeter simulator
//!
//! Provides command-line interface for:
//! - Serving the simulated instrument on a Unix socket
//! - An interactive console that talks to a running server
//!
//! # Usage
//!
//! Start the server:
//! ```bash
//! multimeter serve --channels 4 --socket /tmp/multimeter.sock --log-format json
//! ```
//!
//! Open a console:
//! ```bash
//! multimeter console
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use multimeter_sim::client::MultimeterClient;
use multimeter_sim::console;
use multimeter_sim::config::{MultimeterConfig, DEFAULT_CONFIG_PATH, DEFAULT_SOCKET_PATH};
use multimeter_sim::instrument::{ChannelStore, SimulationScheduler};
use multimeter_sim::logging::{self, OutputFormat, TracingConfig};
use multimeter_sim::network::{MultimeterServer, SessionManager};
use multimeter_sim::protocol::CommandProcessor;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "multimeter")]
#[command(about = "Simulated multi-channel multimeter over a Unix socket", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the simulator and serve the line protocol
    Serve {
        /// Configuration file (TOML)
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Socket path, overriding the configuration
        #[arg(long)]
        socket: Option<PathBuf>,

        /// Number of channels, overriding the configuration
        #[arg(long)]
        channels: Option<usize>,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Interactive prompt sending commands to a running server
    Console {
        /// Socket path of the server
        #[arg(long, default_value = DEFAULT_SOCKET_PATH)]
        socket: PathBuf,
    },
}

/// Logging output options for the server
#[derive(Args)]
struct LogArgs {
    /// Log output format: pretty, compact or json
    #[arg(long, default_value = "compact")]
    log_format: OutputFormat,

    /// Log span open/close events (per-connection spans)
    #[arg(long)]
    log_spans: bool,

    /// Disable ANSI colors in log output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            socket,
            channels,
            log,
        } => serve(config, socket, channels, log).await,
        Commands::Console { socket } => run_console(socket).await,
    }
}

async fn serve(
    config_path: PathBuf,
    socket: Option<PathBuf>,
    channels: Option<usize>,
    log: LogArgs,
) -> Result<()> {
    let mut config = MultimeterConfig::load_from(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    if let Some(socket) = socket {
        config.server.socket_path = socket;
    }
    if let Some(channels) = channels {
        config.instrument.channel_count = channels;
    }
    config.validate().context("Invalid configuration")?;

    let tracing_config = TracingConfig::from_config(&config)
        .map_err(anyhow::Error::msg)?
        .with_format(log.log_format)
        .with_span_events(log.log_spans)
        .with_ansi(!log.no_color);
    logging::init(tracing_config).map_err(anyhow::Error::msg)?;
    info!(
        name = %config.application.name,
        channels = config.instrument.channel_count,
        "Starting multimeter simulator"
    );

    let store = Arc::new(ChannelStore::new(config.instrument.channel_count));
    let processor = CommandProcessor::new(store.clone());
    let server = MultimeterServer::bind(
        &config.server.socket_path,
        processor,
        SessionManager::new(),
    )
    .context("Failed to start listener")?;
    let mut scheduler = SimulationScheduler::spawn(store, config.simulation.clone())
        .context("Failed to start simulation")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    info!("Shutdown signal received");

    shutdown_tx.send_replace(true);
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Server stopped with error"),
        Err(e) => warn!(error = %e, "Server task failed"),
    }
    scheduler.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

async fn run_console(socket: PathBuf) -> Result<()> {
    logging::init(TracingConfig::new(Level::WARN)).map_err(anyhow::Error::msg)?;

    let mut client = match MultimeterClient::connect(&socket).await {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Server not reachable yet, will retry on first command");
            MultimeterClient::new(&socket)
        }
    };

    let stdin = BufReader::new(tokio::io::stdin());
    console::run(&mut client, stdin, tokio::io::stdout()).await?;
    Ok(())
}
