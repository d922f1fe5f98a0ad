// src/config.rs

//! Configuration loading utilities.
//!
//! A TOML file provides the base configuration; environment variables, as
//! injected by the serverless platform, override individual fields.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::models::{ArchiveBackend, Config};

/// Load configuration from an optional file, then apply environment overrides.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) if path.exists() => {
            info!("Loading configuration from {}", path.display());
            Config::load(path)?
        }
        _ => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Override config fields from environment-style variables.
///
/// `lookup` abstracts the environment so overrides can be tested without
/// mutating process state.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = var("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(n) = var("DB_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
        config.database.max_connections = n;
    }
    if let Some(secret) = var("CRON_SECRET") {
        config.auth.cron_secret = Some(secret);
    }

    if let Some(url) = var("GBFS_STATUS_URL") {
        config.feed.status_url = url;
    }
    if let Some(url) = var("GBFS_INFORMATION_URL") {
        config.feed.information_url = url;
    }
    if let Some(secs) = var("FEED_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
        config.feed.timeout_secs = secs;
    }

    if let Some(backend) = var("ARCHIVE_BACKEND") {
        config.archive.backend = backend.parse()?;
    }
    if let Some(bucket) = var("ARCHIVE_BUCKET") {
        config.archive.bucket = Some(bucket);
        // A bucket alone is enough to opt into S3 archival.
        if config.archive.backend == ArchiveBackend::Disabled {
            config.archive.backend = ArchiveBackend::S3;
        }
    }
    if let Some(prefix) = var("ARCHIVE_PREFIX") {
        config.archive.prefix = prefix.trim_matches('/').to_string();
    }
    if let Some(endpoint) = var("ARCHIVE_ENDPOINT") {
        config.archive.endpoint = Some(endpoint);
    }
    if let Some(region) = var("ARCHIVE_REGION") {
        config.archive.region = Some(region);
    }
    if let Some(dir) = var("ARCHIVE_DIR") {
        config.archive.local_dir = Some(dir.into());
    }

    Ok(())
}
