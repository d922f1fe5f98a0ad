//! AWS Lambda entry point for the GBFS collector.
//!
//! Deploy with `cargo lambda build --release --features lambda`.
//!
//! ## Environment Variables
//!
//! - `CRON_SECRET`: shared bearer secret expected from the scheduler
//! - `DATABASE_URL`: Postgres connection string
//! - `ARCHIVE_BUCKET`, `ARCHIVE_PREFIX`, `ARCHIVE_ENDPOINT`, `ARCHIVE_REGION`:
//!   raw payload archive (S3 or R2)
//! - `GBFS_STATUS_URL`, `GBFS_INFORMATION_URL`: feed overrides
//! - `COLLECTOR_CONFIG`: optional TOML config file bundled with the function
//! - `RUST_LOG`: Log level (e.g., `info`, `debug`)

use std::path::PathBuf;

use collector::pipeline::Collector;
use lambda_runtime::{Error as LambdaError, service_fn};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("GBFS Lambda Collector starting...");

    let config_path = std::env::var("COLLECTOR_CONFIG").ok().map(PathBuf::from);
    let config = collector::config::load(config_path.as_deref())?;
    config.validate()?;

    // Built once per cold start; warm invocations reuse the pool.
    let app = Collector::from_config(&config).await?;
    let shared = &app;

    let result = lambda_runtime::run(service_fn(move |event| async move {
        collector::lambda::handler(shared, event).await
    }))
    .await;

    app.shutdown().await;
    result
}
