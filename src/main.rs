mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use snapscheduler::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_path(path.clone())?,
        None => Config::load()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Expire(args) => commands::expire(&config, args).await?,
        Commands::Probe => commands::probe(&config).await?,
    }

    Ok(())
}
