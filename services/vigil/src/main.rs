//! Vigil CLI
//!
//! Command-line interface for the target monitoring and alerting service.

use std::path::PathBuf;

use clap::Parser;
use tracing::Level;
use vigil::{load_config, Config};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Target monitoring and alerting service")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API server port (overrides config file)
    #[arg(long)]
    port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, port={:?}, log_level={:?}",
        args.config,
        args.port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_secrets()?;

    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!("Starting vigil service");
    tracing::debug!(
        "Targets: {}, Channels: {}, Hooks: {}",
        config.targets.len(),
        config.notifiers.len(),
        config.hooks.len()
    );

    vigil::run(config).await?;

    Ok(())
}
