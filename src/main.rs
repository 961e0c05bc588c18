//! igtl-relay - OpenIGTLink Message Relay
//!
//! Sits between an OpenIGTLink client and server, forwards messages in both
//! directions, logs each one and drops blocked message types.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use igtl_relay::{
    config::{CliOverrides, ConfigManager},
    LogSink, ShutdownCoordinator, Supervisor,
};

/// CLI arguments for igtl-relay
#[derive(Parser, Debug)]
#[command(name = "igtl-relay")]
#[command(about = "OpenIGTLink relay with per-type logging and blocking")]
#[command(version)]
#[command(long_about = "
igtl-relay - OpenIGTLink Message Relay

Accepts one client connection at a time on LISTEN_PORT, connects it to
DEST_HOST:DEST_PORT and relays messages in both directions. Every message is
logged to stdout; operational logs go to stderr.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file (--config)
3. Built-in defaults

RUST_LOG overrides --log-level when set.
")]
pub struct CliArgs {
    /// Host of the OpenIGTLink server to relay to
    #[arg(value_name = "DEST_HOST")]
    pub destination_host: String,

    /// Port of the OpenIGTLink server
    #[arg(value_name = "DEST_PORT")]
    pub destination_port: u16,

    /// Port to accept the client on
    #[arg(value_name = "LISTEN_PORT")]
    pub listen_port: u16,

    /// Block a message type (repeatable)
    #[arg(short = 'b', long = "block", value_name = "TYPE")]
    pub block: Vec<String>,

    /// Configuration file path
    #[arg(short, long, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    /// Timeout for resolving and connecting to the destination (e.g. 5s, 500ms)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub connect_timeout: Option<Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

impl CliArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            destination_host: Some(self.destination_host.clone()),
            destination_port: Some(self.destination_port),
            listen_port: Some(self.listen_port),
            blocked_types: self.block.clone(),
            connect_timeout: self.connect_timeout,
            log_level: self.log_level.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Load configuration with priority: CLI args > config file > defaults
    let config = ConfigManager::load(args.config.as_deref(), &args.overrides())
        .context("Final configuration validation failed")?;

    init_tracing(&config.logging.level, args.verbose)?;

    if args.validate_config {
        println!("Configuration is valid");
        println!("{}", config.summary());
        return Ok(());
    }

    info!("Starting igtl-relay v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {}", config.summary());

    let shutdown_coordinator = Arc::new(ShutdownCoordinator::new());
    let sink = Arc::new(if config.logging.buffered_output {
        LogSink::stdout_buffered()
    } else {
        LogSink::stdout()
    });

    let supervisor = Supervisor::bind(&config, Arc::clone(&sink))
        .await
        .context("Failed to start listener")?;

    // Listen for shutdown signals alongside the accept loop
    let shutdown_rx = shutdown_coordinator.subscribe();
    let signal_handle = {
        let coordinator = Arc::clone(&shutdown_coordinator);
        tokio::spawn(async move {
            if let Err(e) = coordinator.listen_for_signals().await {
                error!("Error setting up signal handlers: {}", e);
            }
        })
    };

    info!("Press Ctrl+C or send SIGTERM/SIGINT to shut down");
    if let Err(e) = supervisor.run(shutdown_rx).await {
        error!("Relay error: {}", e);
    }
    signal_handle.abort();
    sink.flush();

    info!(
        "Relay shutdown complete after {} connection pairs",
        supervisor.pairs_served()
    );

    Ok(())
}

/// Initialize tracing/logging. Operational logs go to stderr so stdout carries
/// only the message log.
fn init_tracing(level: &str, verbose: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { level };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();

    Ok(())
}
