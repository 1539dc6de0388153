//! cane-detect - sugarcane disease and insect detection with YOLOv8

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cane_detect::cli::{get_log_level, Cli, Command};
use cane_detect::commands;
use cane_detect::config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(get_log_level(cli.verbose)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = AppConfig::load(cli.config.as_deref())?;
    tracing::debug!("Configuration: {:?}", config);

    match cli.command {
        Command::Serve(args) => commands::serve(config, &args).await,
        Command::Predict(args) => {
            let format = args.format;
            let prediction =
                tokio::task::spawn_blocking(move || commands::predict(&config, &args)).await??;
            println!("{}", commands::render_prediction(&prediction, format)?);
            tracing::info!("Inference completed successfully!");
            Ok(())
        }
        Command::SetupDataset(args) => commands::setup(&args),
        Command::Train(args) => commands::train(&args).await,
    }
}
