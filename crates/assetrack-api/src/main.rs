//! Main entry point for the Assetrack API

use assetrack_api::{config::Config, server::Server, Result};
use assetrack_common::ConfigLoader;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "assetrack-api", about = "Assetrack authentication gateway", version, author)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate example configuration file
    #[arg(long)]
    gen_config: bool,

    #[command(flatten)]
    verbosity: Verbosity<InfoLevel>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.gen_config {
        let example_config = Config::generate_example()?;
        println!("{example_config}");
        return Ok(());
    }

    // Logging format lives in the config, so load it first
    let config = Config::load_validated(args.config.as_deref())?;

    let log_filter = format!("{}=info", env!("CARGO_BIN_NAME").replace('-', "_"));
    assetrack_common::logging::init_logging_with_format(
        &args.verbosity,
        &log_filter,
        config.logging.format,
    )?;

    info!("Starting Assetrack API v{}", assetrack_api::VERSION);
    info!(
        "Configuration loaded, binding to {}",
        config.server.bind_address
    );

    let server = Server::new(config).await?;

    match server.run().await {
        Ok(()) => {
            info!("Assetrack API shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Assetrack API error: {}", e);
            Err(e)
        }
    }
}
