//! One collection run.
//!
//! `AUTHORIZE → FETCH_METADATA → PERSIST_METADATA → FETCH_STATUS → ARCHIVE →
//! LOAD_SNAPSHOT → DETECT_CHANGES → PERSIST_STATUS → DONE`
//!
//! Only authorization, the status fetch and the history insert can fail a
//! run; every other step is logged and skipped.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::models::Config;
use crate::services::{FeedSource, GbfsClient};
use crate::storage::{self, ArchiveSink, PersistenceCoordinator, StationStore};

use super::auth::authorize;
use super::diff::detect_changes;

/// Steps of a collection run, named in fatal errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStep {
    Authorize,
    FetchMetadata,
    PersistMetadata,
    FetchStatus,
    Archive,
    LoadSnapshot,
    DetectChanges,
    PersistStatus,
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStep::Authorize => "AUTHORIZE",
            RunStep::FetchMetadata => "FETCH_METADATA",
            RunStep::PersistMetadata => "PERSIST_METADATA",
            RunStep::FetchStatus => "FETCH_STATUS",
            RunStep::Archive => "ARCHIVE",
            RunStep::LoadSnapshot => "LOAD_SNAPSHOT",
            RunStep::DetectChanges => "DETECT_CHANGES",
            RunStep::PersistStatus => "PERSIST_STATUS",
        };
        f.write_str(name)
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub observed_at: DateTime<Utc>,
    pub stations: usize,
    pub changed: usize,
    pub unchanged: usize,
    /// `None` when the metadata feed or its upsert failed
    pub metadata_upserted: Option<usize>,
    pub snapshot_refreshed: bool,
    pub snapshot_degraded: bool,
    pub archived_to: Option<String>,
}

/// Runs collection passes against injected feed, store and archive.
///
/// Holds no per-run state; one instance serves every invocation of a warm
/// process, sharing the store's connection pool.
pub struct Collector {
    feed: Arc<dyn FeedSource>,
    persistence: PersistenceCoordinator,
    archive: Option<Arc<dyn ArchiveSink>>,
    cron_secret: Option<String>,
}

impl Collector {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        store: Arc<dyn StationStore>,
        archive: Option<Arc<dyn ArchiveSink>>,
        cron_secret: Option<String>,
    ) -> Self {
        Self {
            feed,
            persistence: PersistenceCoordinator::new(store),
            archive,
            cron_secret,
        }
    }

    /// Wire the HTTP feed client, configured store and archive together.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let feed = Arc::new(GbfsClient::new(&config.feed)?);
        let store = storage::connect(&config.database).await?;
        let archive = storage::archive_from_config(&config.archive).await?;
        Ok(Self::new(
            feed,
            store,
            archive,
            config.auth.cron_secret.clone(),
        ))
    }

    /// Authorize the caller, then run one collection pass.
    ///
    /// Nothing is fetched or written unless `authorization` carries the
    /// configured bearer secret.
    pub async fn handle(&self, authorization: Option<&str>) -> Result<RunReport> {
        authorize(authorization, self.cron_secret.as_deref())
            .map_err(|e| e.at(RunStep::Authorize))?;
        self.run().await
    }

    /// Run one collection pass without the authorization gate.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<RunReport> {
        let metadata_upserted = match self.feed.fetch_metadata().await {
            Ok(records) => self.persistence.upsert_metadata(&records).await,
            Err(e) => {
                warn!("Error fetching station info: {}", e);
                None
            }
        };

        let status = self
            .feed
            .fetch_status()
            .await
            .map_err(|e| e.at(RunStep::FetchStatus))?;

        let archived_to = match &self.archive {
            Some(sink) => match sink.archive(&status.raw, status.observed_at).await {
                Ok(location) => Some(location),
                Err(e) => {
                    warn!("Failed to archive raw status: {}", e);
                    None
                }
            },
            None => None,
        };

        let previous = self.persistence.load_current_snapshot().await;
        let changes = detect_changes(&previous.snapshot, &status.stations);
        info!(
            "{} of {} stations changed",
            changes.changed.len(),
            changes.total()
        );

        let written = self
            .persistence
            .apply_status_update(&status.stations, &changes.changed, status.observed_at)
            .await
            .map_err(|e| e.at(RunStep::PersistStatus))?;

        let report = RunReport {
            observed_at: status.observed_at,
            stations: status.stations.len(),
            changed: written.history_inserted,
            unchanged: changes.unchanged.len(),
            metadata_upserted,
            snapshot_refreshed: written.current_upserted.is_some(),
            snapshot_degraded: previous.degraded,
            archived_to,
        };
        info!(
            "Collection complete: {} stations, {} changed, metadata {:?}",
            report.stations, report.changed, report.metadata_upserted
        );
        Ok(report)
    }

    /// Release pooled connections. Used on shutdown and between tests.
    pub async fn shutdown(&self) {
        self.persistence.store().close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::error::AppError;
    use crate::models::{
        StationMetadata, StationStatus, StatusFeed, StatusSnapshot, TableCounts, status,
    };
    use crate::storage::HISTORY_BATCH;

    const SECRET: &str = "s3cret";
    const AUTH: Option<&str> = Some("Bearer s3cret");

    struct FakeFeed {
        metadata_fails: bool,
        status: Option<Vec<StationStatus>>,
        calls: Mutex<usize>,
    }

    impl FakeFeed {
        fn new(stations: Vec<StationStatus>) -> Self {
            Self {
                metadata_fails: false,
                status: Some(stations),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl FeedSource for FakeFeed {
        async fn fetch_metadata(&self) -> Result<Vec<StationMetadata>> {
            *self.calls.lock().unwrap() += 1;
            if self.metadata_fails {
                return Err(AppError::feed("station_information", "HTTP status server error (500)"));
            }
            let stations = self.status.clone().unwrap_or_default();
            Ok(stations
                .iter()
                .map(|s| StationMetadata {
                    station_id: s.station_id.clone(),
                    name: format!("Station {}", s.station_id),
                    lat: 43.6,
                    lon: -79.4,
                    capacity: 20,
                    last_updated: Utc::now(),
                })
                .collect())
        }

        async fn fetch_status(&self) -> Result<StatusFeed> {
            *self.calls.lock().unwrap() += 1;
            let stations = self
                .status
                .clone()
                .ok_or_else(|| AppError::feed("station_status", "connection refused"))?;
            Ok(StatusFeed {
                observed_at: Utc.timestamp_opt(1735689600, 0).unwrap(),
                stations,
                raw: b"{\"raw\":true}".to_vec(),
            })
        }
    }

    #[derive(Default)]
    struct MemoryState {
        metadata: HashMap<String, StationMetadata>,
        current: StatusSnapshot,
        history: Vec<(DateTime<Utc>, StationStatus)>,
        writes: usize,
    }

    #[derive(Default)]
    struct MemoryStore {
        state: Mutex<MemoryState>,
        fail_metadata: bool,
        fail_snapshot: bool,
        fail_current: bool,
        fail_history: bool,
    }

    impl MemoryStore {
        fn seeded(statuses: &[StationStatus]) -> Self {
            let store = Self::default();
            store.state.lock().unwrap().current = statuses
                .iter()
                .map(|s| (s.station_id.clone(), s.clone()))
                .collect();
            store
        }

        fn history(&self) -> Vec<StationStatus> {
            let state = self.state.lock().unwrap();
            state.history.iter().map(|(_, s)| s.clone()).collect()
        }

        fn current(&self) -> StatusSnapshot {
            self.state.lock().unwrap().current.clone()
        }

        fn writes(&self) -> usize {
            self.state.lock().unwrap().writes
        }
    }

    #[async_trait]
    impl StationStore for MemoryStore {
        async fn upsert_metadata(&self, stations: &[StationMetadata]) -> Result<usize> {
            if self.fail_metadata {
                return Err(AppError::persistence("metadata", "deadlock detected"));
            }
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            for s in stations {
                state.metadata.insert(s.station_id.clone(), s.clone());
            }
            Ok(stations.len())
        }

        async fn load_current_snapshot(&self) -> Result<StatusSnapshot> {
            if self.fail_snapshot {
                return Err(AppError::SnapshotUnavailable("pool timed out".into()));
            }
            Ok(self.current())
        }

        async fn upsert_current_status(
            &self,
            statuses: &[StationStatus],
            _observed_at: DateTime<Utc>,
        ) -> Result<usize> {
            if self.fail_current {
                return Err(AppError::persistence("current_status", "disk full"));
            }
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            for s in statuses {
                state.current.insert(s.station_id.clone(), s.clone());
            }
            Ok(statuses.len())
        }

        async fn insert_history(
            &self,
            statuses: &[StationStatus],
            observed_at: DateTime<Utc>,
        ) -> Result<usize> {
            if self.fail_history {
                return Err(AppError::persistence(HISTORY_BATCH, "connection reset"));
            }
            let mut state = self.state.lock().unwrap();
            state.writes += 1;
            state
                .history
                .extend(statuses.iter().map(|s| (observed_at, s.clone())));
            Ok(statuses.len())
        }

        async fn counts(&self) -> Result<TableCounts> {
            let state = self.state.lock().unwrap();
            Ok(TableCounts {
                stations: state.metadata.len() as i64,
                current_status: state.current.len() as i64,
                history: state.history.len() as i64,
            })
        }

        async fn migrate(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct MemoryArchive {
        objects: Mutex<HashMap<String, Vec<u8>>>,
        fails: bool,
    }

    #[async_trait]
    impl ArchiveSink for MemoryArchive {
        async fn archive(&self, raw: &[u8], observed_at: DateTime<Utc>) -> Result<String> {
            if self.fails {
                return Err(AppError::ArchivalFailed("credentials missing".into()));
            }
            let key = crate::storage::archive_key("raw", observed_at);
            self.objects
                .lock()
                .unwrap()
                .insert(key.clone(), raw.to_vec());
            Ok(key)
        }
    }

    fn collector(
        feed: Arc<FakeFeed>,
        store: Arc<MemoryStore>,
        archive: Arc<MemoryArchive>,
    ) -> Collector {
        Collector::new(feed, store, Some(archive), Some(SECRET.to_string()))
    }

    #[tokio::test]
    async fn test_unchanged_poll_writes_no_history() {
        let store = Arc::new(MemoryStore::seeded(&[status("S1", 3, 5)]));
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let report = c.handle(AUTH).await.unwrap();

        assert_eq!(report.changed, 0);
        assert_eq!(report.unchanged, 1);
        assert!(report.snapshot_refreshed);
        assert!(store.history().is_empty());
        assert_eq!(store.current()["S1"], status("S1", 3, 5));
    }

    #[tokio::test]
    async fn test_changed_station_appends_history() {
        let store = Arc::new(MemoryStore::seeded(&[status("S1", 3, 5)]));
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 2, 6)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let report = c.handle(AUTH).await.unwrap();

        assert_eq!(report.changed, 1);
        assert_eq!(store.history(), vec![status("S1", 2, 6)]);
        assert_eq!(store.current()["S1"], status("S1", 2, 6));
    }

    #[tokio::test]
    async fn test_new_station_goes_to_snapshot_and_history() {
        let store = Arc::new(MemoryStore::seeded(&[status("S1", 3, 5)]));
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5), status("S2", 7, 1)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        c.handle(AUTH).await.unwrap();

        assert_eq!(store.history(), vec![status("S2", 7, 1)]);
        assert_eq!(store.current()["S2"], status("S2", 7, 1));
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5), status("S2", 0, 9)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let first = c.handle(AUTH).await.unwrap();
        let second = c.handle(AUTH).await.unwrap();

        assert_eq!(first.changed, 2);
        assert_eq!(second.changed, 0);
        assert_eq!(store.history().len(), 2);
        assert_eq!(store.current().len(), 2);
    }

    #[tokio::test]
    async fn test_metadata_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::default());
        let feed = Arc::new(FakeFeed {
            metadata_fails: true,
            ..FakeFeed::new(vec![status("S1", 3, 5)])
        });
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let report = c.handle(AUTH).await.unwrap();

        assert!(report.metadata_upserted.is_none());
        assert_eq!(report.changed, 1);
        assert_eq!(store.counts().await.unwrap().stations, 0);
    }

    #[tokio::test]
    async fn test_metadata_upsert_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore {
            fail_metadata: true,
            ..MemoryStore::default()
        });
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let report = c.handle(AUTH).await.unwrap();
        assert!(report.metadata_upserted.is_none());
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_history_failure_fails_run() {
        let store = Arc::new(MemoryStore {
            fail_history: true,
            ..MemoryStore::seeded(&[status("S1", 3, 5)])
        });
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 2, 6)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let err = c.handle(AUTH).await.unwrap_err();

        assert_eq!(err.step(), Some(RunStep::PersistStatus));
        // The snapshot batch committed independently.
        assert_eq!(store.current()["S1"], status("S1", 2, 6));
    }

    #[tokio::test]
    async fn test_current_status_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore {
            fail_current: true,
            ..MemoryStore::seeded(&[status("S1", 3, 5)])
        });
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 2, 6)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let report = c.handle(AUTH).await.unwrap();

        assert!(!report.snapshot_refreshed);
        assert_eq!(store.history(), vec![status("S1", 2, 6)]);
    }

    #[tokio::test]
    async fn test_unauthorized_performs_no_work() {
        for header in [None, Some("Bearer wrong")] {
            let store = Arc::new(MemoryStore::default());
            let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5)]));
            let archive = Arc::new(MemoryArchive::default());
            let c = collector(Arc::clone(&feed), Arc::clone(&store), Arc::clone(&archive));

            let err = c.handle(header).await.unwrap_err();

            assert!(err.is_unauthorized());
            assert_eq!(err.step(), Some(RunStep::Authorize));
            assert_eq!(store.writes(), 0);
            assert_eq!(*feed.calls.lock().unwrap(), 0);
            assert!(archive.objects.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_status_feed_failure_is_fatal() {
        let store = Arc::new(MemoryStore::default());
        let feed = Arc::new(FakeFeed {
            status: None,
            ..FakeFeed::new(Vec::new())
        });
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let err = c.handle(AUTH).await.unwrap_err();
        assert_eq!(err.step(), Some(RunStep::FetchStatus));
        assert!(store.history().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_degrades_to_full_insert() {
        let store = Arc::new(MemoryStore {
            fail_snapshot: true,
            ..MemoryStore::seeded(&[status("S1", 3, 5)])
        });
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5), status("S2", 1, 1)]));
        let c = collector(feed, Arc::clone(&store), Arc::default());

        let report = c.handle(AUTH).await.unwrap();

        assert!(report.snapshot_degraded);
        assert_eq!(store.history().len(), 2);
    }

    #[tokio::test]
    async fn test_archive_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::default());
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5)]));
        let archive = Arc::new(MemoryArchive {
            fails: true,
            ..MemoryArchive::default()
        });
        let c = collector(feed, Arc::clone(&store), archive);

        let report = c.handle(AUTH).await.unwrap();
        assert!(report.archived_to.is_none());
        assert_eq!(store.history().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_stores_raw_payload_once_per_timestamp() {
        let store = Arc::new(MemoryStore::default());
        let feed = Arc::new(FakeFeed::new(vec![status("S1", 3, 5)]));
        let archive = Arc::new(MemoryArchive::default());
        let c = collector(feed, store, Arc::clone(&archive));

        let report = c.handle(AUTH).await.unwrap();
        c.handle(AUTH).await.unwrap();

        let objects = archive.objects.lock().unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(
            report.archived_to.as_deref(),
            Some("raw/station_status_1735689600.json")
        );
        assert_eq!(objects["raw/station_status_1735689600.json"], b"{\"raw\":true}");
    }

    #[test]
    fn test_run_step_display() {
        assert_eq!(RunStep::LoadSnapshot.to_string(), "LOAD_SNAPSHOT");
        assert_eq!(
            serde_json::to_string(&RunStep::FetchMetadata).unwrap(),
            "\"FETCH_METADATA\""
        );
    }
}
