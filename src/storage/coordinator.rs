//! Failure policy around the three station write batches.
//!
//! | batch            | on failure                               |
//! |------------------|------------------------------------------|
//! | metadata upsert  | logged, run continues                    |
//! | snapshot read    | logged, every station treated as changed |
//! | current upsert   | logged, run continues                    |
//! | history insert   | returned as an error                     |
//!
//! Overlapping runs can both read the same stale snapshot and both append
//! the same transition. History is an observational log, so such duplicates
//! are tolerated rather than locked against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::models::{StationMetadata, StationStatus, StatusSnapshot};
use crate::storage::StationStore;

/// Result of reading the previous snapshot.
#[derive(Debug, Default)]
pub struct SnapshotLoad {
    pub snapshot: StatusSnapshot,
    /// The read failed and an empty snapshot was substituted
    pub degraded: bool,
}

/// What the status write step did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusWriteSummary {
    pub current_upserted: Option<usize>,
    pub history_inserted: usize,
}

#[derive(Clone)]
pub struct PersistenceCoordinator {
    store: Arc<dyn StationStore>,
}

impl PersistenceCoordinator {
    pub fn new(store: Arc<dyn StationStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn StationStore> {
        &self.store
    }

    /// Upsert metadata; `None` means the batch failed and was logged.
    pub async fn upsert_metadata(&self, records: &[StationMetadata]) -> Option<usize> {
        if records.is_empty() {
            return Some(0);
        }
        match self.store.upsert_metadata(records).await {
            Ok(n) => {
                info!(batch = "metadata", rows = n, "Upserted station metadata");
                Some(n)
            }
            Err(e) => {
                warn!(
                    batch = "metadata",
                    rows = records.len(),
                    "Metadata upsert failed: {}",
                    e
                );
                None
            }
        }
    }

    /// Load the previous snapshot, degrading to empty on failure.
    pub async fn load_current_snapshot(&self) -> SnapshotLoad {
        match self.store.load_current_snapshot().await {
            Ok(snapshot) => SnapshotLoad {
                snapshot,
                degraded: false,
            },
            Err(e) => {
                warn!("{}. Proceeding with full history insert.", e);
                SnapshotLoad {
                    snapshot: StatusSnapshot::new(),
                    degraded: true,
                }
            }
        }
    }

    /// Refresh the snapshot for `all` and append `changed` to history.
    ///
    /// Only a history failure is returned; a snapshot upsert failure is logged.
    pub async fn apply_status_update(
        &self,
        all: &[StationStatus],
        changed: &[StationStatus],
        observed_at: DateTime<Utc>,
    ) -> Result<StatusWriteSummary> {
        let current_upserted = match self.store.upsert_current_status(all, observed_at).await {
            Ok(n) => Some(n),
            Err(e) => {
                error!(
                    batch = "current_status",
                    rows = all.len(),
                    "Current status upsert failed: {}",
                    e
                );
                None
            }
        };

        let history_inserted = if changed.is_empty() {
            info!("No station status changes detected. Skipping history insert.");
            0
        } else {
            info!("Inserting {} changed station statuses...", changed.len());
            let n = self.store.insert_history(changed, observed_at).await?;
            info!(batch = "history", rows = n, "Inserted history batch");
            n
        };

        Ok(StatusWriteSummary {
            current_upserted,
            history_inserted,
        })
    }
}
