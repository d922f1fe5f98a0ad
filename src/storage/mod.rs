//! Storage abstractions for station telemetry.
//!
//! Three logical tables live behind [`StationStore`]:
//! - `stations`: metadata, upserted wholesale every poll
//! - `current_station_status`: one row per station, overwritten every poll
//! - `station_status`: append-only history, written only on change
//!
//! Raw status payloads go to cold storage through [`ArchiveSink`]:
//!
//! ```text
//! {bucket or dir}/
//! └── raw/
//!     ├── station_status_1735689600.json
//!     └── station_status_1735689660.json
//! ```

mod coordinator;
pub mod local;
pub mod postgres;
#[cfg(feature = "s3")]
pub mod s3;
pub mod sqlite;
mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{
    ArchiveBackend, ArchiveConfig, DatabaseConfig, StationMetadata, StationStatus, StatusSnapshot,
    TableCounts,
};

// Re-export for convenience
pub use coordinator::{PersistenceCoordinator, SnapshotLoad, StatusWriteSummary};
pub use local::LocalArchive;
pub use postgres::PgStore;
pub use sqlite::SqliteStore;

pub const METADATA_BATCH: &str = "metadata";
pub const CURRENT_STATUS_BATCH: &str = "current_status";
pub const HISTORY_BATCH: &str = "history";

/// Relational store for the three station tables.
///
/// Every write method runs as one transaction: all rows land or none do.
#[async_trait]
pub trait StationStore: Send + Sync {
    /// Insert or overwrite metadata keyed by station id.
    async fn upsert_metadata(&self, stations: &[StationMetadata]) -> Result<usize>;

    /// Read every row of the current status table.
    async fn load_current_snapshot(&self) -> Result<StatusSnapshot>;

    /// Insert or overwrite the current status of every given station.
    async fn upsert_current_status(
        &self,
        statuses: &[StationStatus],
        observed_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Append history rows. Never updates or deletes.
    async fn insert_history(
        &self,
        statuses: &[StationStatus],
        observed_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Row counts of the three tables.
    async fn counts(&self) -> Result<TableCounts>;

    /// Apply pending schema migrations.
    async fn migrate(&self) -> Result<()>;

    /// Close the underlying pool.
    async fn close(&self);
}

/// Cold storage for verbatim status payloads.
#[async_trait]
pub trait ArchiveSink: Send + Sync {
    /// Store `raw` under a key derived from `observed_at`, returning its location.
    ///
    /// Re-archiving the same timestamp overwrites the previous object.
    async fn archive(&self, raw: &[u8], observed_at: DateTime<Utc>) -> Result<String>;
}

/// Object key for a status poll observed at `observed_at`.
pub fn archive_key(prefix: &str, observed_at: DateTime<Utc>) -> String {
    let name = format!("station_status_{}.json", observed_at.timestamp());
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name
    } else {
        format!("{prefix}/{name}")
    }
}

/// Open the store selected by the URL scheme.
///
/// Postgres pools connect lazily, so this does not touch the network.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn StationStore>> {
    if config.url.starts_with("postgres://") || config.url.starts_with("postgresql://") {
        info!("Using Postgres store");
        Ok(Arc::new(PgStore::connect_lazy(config)?))
    } else if config.url.starts_with("sqlite:") {
        info!("Using SQLite store at {}", config.url);
        Ok(Arc::new(SqliteStore::open(config).await?))
    } else {
        Err(AppError::config(
            "database.url must start with postgres:// or sqlite:",
        ))
    }
}

/// Build the configured archive sink, if any.
pub async fn archive_from_config(config: &ArchiveConfig) -> Result<Option<Arc<dyn ArchiveSink>>> {
    match config.backend {
        ArchiveBackend::Disabled => Ok(None),
        ArchiveBackend::Local => {
            let dir = config
                .local_dir
                .as_ref()
                .ok_or_else(|| AppError::config("archive.local_dir is not set"))?;
            Ok(Some(Arc::new(LocalArchive::new(dir, &config.prefix))))
        }
        #[cfg(feature = "s3")]
        ArchiveBackend::S3 => Ok(Some(Arc::new(s3::S3Archive::from_config(config).await?))),
        #[cfg(not(feature = "s3"))]
        ArchiveBackend::S3 => Err(AppError::config(
            "S3 archival requires the 's3' feature",
        )),
    }
}
