//! Relay Channels - Main entry point.

use anyhow::{Context, Result};
use clap::Parser;
use relay_channels::start;
use relay_common::config::Config;
use relay_common::logging::init_logging;
use std::path::PathBuf;

/// IRC chat relay backed by a text-generation service.
#[derive(Parser, Debug)]
#[command(name = "relay-channels", version, about)]
struct Cli {
    /// Path to a JSON config file (defaults to ~/.chatrelay/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Chat on stdin/stdout instead of connecting to IRC
    #[arg(long)]
    cli: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load_with_env(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    config.validate().context("invalid configuration")?;

    tracing::info!("Relay Channels v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        server = %config.irc.address(),
        channel = %config.irc.channel,
        nick = %config.irc.nick,
        "Starting relay"
    );

    start(&config, cli.cli).await
}
