//! hazardscan CLI - tag photos of a living space with environmental-hazard labels.
//!
//! Every image in a directory is scored against a hazard taxonomy with CLIP,
//! checked with a YOLOv8 object detector, and written as one row of a
//! categorized report.
//!
//! # Usage
//!
//! ```bash
//! # Scan a directory into the default CSV report
//! hazardscan scan ./photos/
//!
//! # JSON Lines output with a custom taxonomy
//! hazardscan scan ./photos/ -f jsonl -o report.jsonl --taxonomy home.toml
//!
//! # Fetch the scorer models
//! hazardscan models download
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// hazardscan - environmental hazard tagging for home photos.
#[derive(Parser, Debug)]
#[command(name = "hazardscan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan images and write the hazard report
    Scan(cli::scan::ScanArgs),

    /// Manage models (download, list, path)
    Models(cli::models::ModelsArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),

    /// Inspect the hazard taxonomy
    Taxonomy(cli::taxonomy::TaxonomyArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't up yet, so config problems go straight to stderr here.
    // `scan` reloads the config and refuses to run on an invalid one.
    let config = match hazardscan_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default logging settings. Check your config file with `hazardscan config path`."
            );
            hazardscan_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("hazardscan v{}", hazardscan_core::VERSION);

    match cli.command {
        Commands::Scan(args) => cli::scan::execute(args).await,
        Commands::Models(args) => cli::models::execute(args).await,
        Commands::Config(args) => cli::config::execute(args).await,
        Commands::Taxonomy(args) => cli::taxonomy::execute(args).await,
    }
}
