//! Sentinel - entry point.
//!
//! Observation mode: signal gate and alerts only.
//! Trading mode: full pipeline against the paper exchange.

use anyhow::Result;
use clap::Parser;
use tracing::info;

use sentinel_bot::{AppConfig, Application};

/// Signal throttle and order lifecycle engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SENTINEL_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sentinel_telemetry::init_logging()?;

    info!("Starting sentinel v{}", env!("CARGO_PKG_VERSION"));

    let config_path = AppConfig::resolve_path(args.config);
    info!(config_path = %config_path, "Loading configuration");

    let config = AppConfig::from_file(&config_path)?;
    info!(
        mode = ?config.mode,
        symbols = config.symbols.len(),
        strategies = config.strategies.len(),
        "Configuration loaded"
    );

    let app = Application::new(config, Some(config_path))?;
    app.run().await?;

    Ok(())
}
