//! GBFS collector CLI
//!
//! Local execution entry point. For AWS Lambda, use `collector-lambda`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use collector::{
    config,
    error::Result,
    pipeline::Collector,
    storage,
};

/// GBFS station telemetry collector
#[derive(Parser, Debug)]
#[command(name = "collector", version, about = "Bike-share station telemetry collector")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "collector.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the feed once and persist changes
    Run,

    /// Create or upgrade the database schema
    Migrate,

    /// Show row counts of the station tables
    Info,

    /// Validate configuration
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("GBFS collector starting...");

    let config = config::load(Some(cli.config.as_path()))?;

    match cli.command {
        Command::Run => {
            config.validate()?;
            let collector = Collector::from_config(&config).await?;
            // Local runs are trusted; the gate only guards remote triggers.
            let report = collector.run().await;
            collector.shutdown().await;
            let report = report?;

            log::info!("Observed at: {}", report.observed_at);
            log::info!(
                "Stations: {} ({} changed, {} unchanged)",
                report.stations,
                report.changed,
                report.unchanged
            );
            match report.metadata_upserted {
                Some(n) => log::info!("Metadata upserted: {}", n),
                None => log::warn!("Metadata was not updated this run"),
            }
            if let Some(location) = &report.archived_to {
                log::info!("Archived to {}", location);
            }
        }

        Command::Migrate => {
            let store = storage::connect(&config.database).await?;
            store.migrate().await?;
            store.close().await;
            log::info!("All migrations completed.");
        }

        Command::Info => {
            let store = storage::connect(&config.database).await?;
            let counts = store.counts().await;
            store.close().await;
            let counts = counts?;

            log::info!("Database: {}", redact(&config.database.url));
            log::info!("Stations: {}", counts.stations);
            log::info!("Current status rows: {}", counts.current_status);
            log::info!("History rows: {}", counts.history);
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    log::info!("Done!");

    Ok(())
}

/// Hide credentials in a database URL.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) if parsed.password().is_some() => {
            let _ = parsed.set_password(Some("****"));
            parsed.to_string()
        }
        _ => url.to_string(),
    }
}
