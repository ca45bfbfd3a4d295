//! Team Holdings Exporter - estimate how much of a token's supply its team controls
//!
//! Combines a holder snapshot with early post-deployment transfer heuristics
//! and an optional known-team list. Results are estimates, not proof of
//! ownership.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

// Use the library crate
use team_holdings::cli::commands::{self, ExportArgs};
use team_holdings::config::Config;
use team_holdings::Error;

/// Team Holdings Exporter
#[derive(Parser)]
#[command(name = "team-holdings")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "team-holdings.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch holders, classify team wallets and write the report
    Export(ExportArgs),

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("team_holdings=info")),
        )
        .with_target(false)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Export(args) => commands::export(&config, &args).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        let configuration = e
            .downcast_ref::<Error>()
            .map(Error::is_configuration)
            .unwrap_or(false);
        std::process::exit(if configuration { 2 } else { 1 });
    }

    Ok(())
}
