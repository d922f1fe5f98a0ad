//! Batch statements shared by the Postgres and SQLite stores.
//!
//! `QueryBuilder` renders placeholders for its backend (`$n` or `?`), so each
//! statement is written once here. [`impl_station_store`] expands the
//! [`StationStore`](crate::storage::StationStore) methods for a concrete
//! pool type.

use std::collections::HashSet;

/// Rows per multi-row statement. At eight binds per row this stays far
/// below the bind limit of either backend.
pub(crate) const ROWS_PER_STATEMENT: usize = 1000;

pub(crate) const INSERT_PLACEHOLDER_STATIONS: &str = "INSERT INTO stations (station_id, name) ";

pub(crate) const ON_CONFLICT_KEEP_STATION: &str = " ON CONFLICT (station_id) DO NOTHING";

pub(crate) const INSERT_METADATA: &str =
    "INSERT INTO stations (station_id, name, lat, lon, capacity, last_updated) ";

pub(crate) const ON_CONFLICT_UPDATE_METADATA: &str = r#" ON CONFLICT (station_id) DO UPDATE SET
    name = excluded.name,
    lat = excluded.lat,
    lon = excluded.lon,
    capacity = excluded.capacity,
    last_updated = excluded.last_updated"#;

pub(crate) const INSERT_CURRENT_STATUS: &str = r#"INSERT INTO current_station_status (
    station_id,
    num_bikes_available,
    num_ebikes_available,
    num_docks_available,
    is_installed,
    is_renting,
    is_returning,
    last_updated
) "#;

pub(crate) const ON_CONFLICT_UPDATE_STATUS: &str = r#" ON CONFLICT (station_id) DO UPDATE SET
    num_bikes_available = excluded.num_bikes_available,
    num_ebikes_available = excluded.num_ebikes_available,
    num_docks_available = excluded.num_docks_available,
    is_installed = excluded.is_installed,
    is_renting = excluded.is_renting,
    is_returning = excluded.is_returning,
    last_updated = excluded.last_updated"#;

pub(crate) const INSERT_HISTORY: &str = r#"INSERT INTO station_status (
    time,
    station_id,
    num_bikes_available,
    num_ebikes_available,
    num_docks_available,
    is_installed,
    is_renting,
    is_returning
) "#;

pub(crate) const SELECT_CURRENT_STATUS: &str = r#"SELECT
    station_id,
    num_bikes_available,
    num_ebikes_available,
    num_docks_available,
    is_installed,
    is_renting,
    is_returning
FROM current_station_status"#;

pub(crate) const SELECT_COUNTS: &str = r#"SELECT
    (SELECT COUNT(*) FROM stations) AS stations,
    (SELECT COUNT(*) FROM current_station_status) AS current_status,
    (SELECT COUNT(*) FROM station_status) AS history"#;

/// Keep only the last record for each station id.
///
/// A multi-row upsert may not touch the same key twice, so repeated ids in
/// one feed collapse to their final occurrence.
pub(crate) fn last_per_station<'a, T>(rows: &'a [T], id: impl Fn(&T) -> &str) -> Vec<&'a T> {
    let mut seen = HashSet::new();
    let mut kept: Vec<&T> = rows.iter().rev().filter(|row| seen.insert(id(*row))).collect();
    kept.reverse();
    kept
}

/// Implement `StationStore` for a store with a `pool` field of the given
/// database type.
macro_rules! impl_station_store {
    ($store:ty, $db:ty, $migrator:expr) => {
        impl $store {
            /// Make sure every referenced station has a metadata row.
            async fn ensure_stations(
                tx: &mut ::sqlx::Transaction<'_, $db>,
                ids: &[&str],
            ) -> ::sqlx::Result<()> {
                use $crate::storage::sql;

                for chunk in ids.chunks(sql::ROWS_PER_STATEMENT) {
                    let mut builder =
                        ::sqlx::QueryBuilder::<$db>::new(sql::INSERT_PLACEHOLDER_STATIONS);
                    builder.push_values(chunk, |mut row, id| {
                        row.push_bind(*id).push_bind(*id);
                    });
                    builder.push(sql::ON_CONFLICT_KEEP_STATION);
                    builder.build().execute(&mut **tx).await?;
                }
                Ok(())
            }
        }

        #[::async_trait::async_trait]
        impl $crate::storage::StationStore for $store {
            async fn upsert_metadata(
                &self,
                stations: &[$crate::models::StationMetadata],
            ) -> $crate::error::Result<usize> {
                use $crate::storage::sql;

                let rows = sql::last_per_station(stations, |s| s.station_id.as_str());
                if rows.is_empty() {
                    return Ok(0);
                }

                let run = async {
                    let mut tx = self.pool.begin().await?;
                    for chunk in rows.chunks(sql::ROWS_PER_STATEMENT) {
                        let mut builder = ::sqlx::QueryBuilder::<$db>::new(sql::INSERT_METADATA);
                        builder.push_values(chunk, |mut row, s| {
                            row.push_bind(&s.station_id)
                                .push_bind(&s.name)
                                .push_bind(s.lat)
                                .push_bind(s.lon)
                                .push_bind(s.capacity)
                                .push_bind(s.last_updated);
                        });
                        builder.push(sql::ON_CONFLICT_UPDATE_METADATA);
                        builder.build().execute(&mut *tx).await?;
                    }
                    tx.commit().await?;
                    Ok::<_, ::sqlx::Error>(())
                };
                run.await.map_err(|e| {
                    $crate::error::AppError::persistence($crate::storage::METADATA_BATCH, e)
                })?;
                Ok(rows.len())
            }

            async fn load_current_snapshot(
                &self,
            ) -> $crate::error::Result<$crate::models::StatusSnapshot> {
                use ::futures::TryStreamExt;
                use ::sqlx::Row;
                use $crate::storage::sql;

                let load = async {
                    let mut rows = ::sqlx::query::<$db>(sql::SELECT_CURRENT_STATUS).fetch(&self.pool);
                    let mut snapshot = $crate::models::StatusSnapshot::new();
                    while let Some(row) = rows.try_next().await? {
                        let status = $crate::models::StationStatus {
                            station_id: row.try_get("station_id")?,
                            num_bikes_available: row.try_get("num_bikes_available")?,
                            num_ebikes_available: row.try_get("num_ebikes_available")?,
                            num_docks_available: row.try_get("num_docks_available")?,
                            is_installed: row.try_get("is_installed")?,
                            is_renting: row.try_get("is_renting")?,
                            is_returning: row.try_get("is_returning")?,
                        };
                        snapshot.insert(status.station_id.clone(), status);
                    }
                    Ok::<_, ::sqlx::Error>(snapshot)
                };

                load.await
                    .map_err(|e| $crate::error::AppError::SnapshotUnavailable(e.to_string()))
            }

            async fn upsert_current_status(
                &self,
                statuses: &[$crate::models::StationStatus],
                observed_at: ::chrono::DateTime<::chrono::Utc>,
            ) -> $crate::error::Result<usize> {
                use $crate::storage::sql;

                let rows = sql::last_per_station(statuses, |s| s.station_id.as_str());
                if rows.is_empty() {
                    return Ok(0);
                }
                let ids: Vec<&str> = rows.iter().map(|s| s.station_id.as_str()).collect();

                let run = async {
                    let mut tx = self.pool.begin().await?;
                    Self::ensure_stations(&mut tx, &ids).await?;
                    for chunk in rows.chunks(sql::ROWS_PER_STATEMENT) {
                        let mut builder =
                            ::sqlx::QueryBuilder::<$db>::new(sql::INSERT_CURRENT_STATUS);
                        builder.push_values(chunk, |mut row, s| {
                            row.push_bind(&s.station_id)
                                .push_bind(s.num_bikes_available)
                                .push_bind(s.num_ebikes_available)
                                .push_bind(s.num_docks_available)
                                .push_bind(s.is_installed)
                                .push_bind(s.is_renting)
                                .push_bind(s.is_returning)
                                .push_bind(observed_at);
                        });
                        builder.push(sql::ON_CONFLICT_UPDATE_STATUS);
                        builder.build().execute(&mut *tx).await?;
                    }
                    tx.commit().await?;
                    Ok::<_, ::sqlx::Error>(())
                };
                run.await.map_err(|e| {
                    $crate::error::AppError::persistence($crate::storage::CURRENT_STATUS_BATCH, e)
                })?;
                Ok(rows.len())
            }

            async fn insert_history(
                &self,
                statuses: &[$crate::models::StationStatus],
                observed_at: ::chrono::DateTime<::chrono::Utc>,
            ) -> $crate::error::Result<usize> {
                use $crate::storage::sql;

                if statuses.is_empty() {
                    return Ok(0);
                }
                let ids: Vec<&str> = statuses.iter().map(|s| s.station_id.as_str()).collect();

                let run = async {
                    let mut tx = self.pool.begin().await?;
                    Self::ensure_stations(&mut tx, &ids).await?;
                    for chunk in statuses.chunks(sql::ROWS_PER_STATEMENT) {
                        let mut builder = ::sqlx::QueryBuilder::<$db>::new(sql::INSERT_HISTORY);
                        builder.push_values(chunk, |mut row, s| {
                            row.push_bind(observed_at)
                                .push_bind(&s.station_id)
                                .push_bind(s.num_bikes_available)
                                .push_bind(s.num_ebikes_available)
                                .push_bind(s.num_docks_available)
                                .push_bind(s.is_installed)
                                .push_bind(s.is_renting)
                                .push_bind(s.is_returning);
                        });
                        builder.build().execute(&mut *tx).await?;
                    }
                    tx.commit().await?;
                    Ok::<_, ::sqlx::Error>(())
                };
                run.await.map_err(|e| {
                    $crate::error::AppError::persistence($crate::storage::HISTORY_BATCH, e)
                })?;
                Ok(statuses.len())
            }

            async fn counts(&self) -> $crate::error::Result<$crate::models::TableCounts> {
                use ::sqlx::Row;
                use $crate::storage::sql;

                let row = ::sqlx::query::<$db>(sql::SELECT_COUNTS)
                    .fetch_one(&self.pool)
                    .await?;

                Ok($crate::models::TableCounts {
                    stations: row.try_get("stations")?,
                    current_status: row.try_get("current_status")?,
                    history: row.try_get("history")?,
                })
            }

            async fn migrate(&self) -> $crate::error::Result<()> {
                $migrator.run(&self.pool).await?;
                Ok(())
            }

            async fn close(&self) {
                self.pool.close().await;
            }
        }
    };
}

pub(crate) use impl_station_store;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::status;

    #[test]
    fn test_last_per_station_keeps_final_record() {
        let rows = vec![status("S1", 1, 9), status("S2", 4, 4), status("S1", 2, 8)];
        let kept = last_per_station(&rows, |s| s.station_id.as_str());

        assert_eq!(kept, vec![&status("S2", 4, 4), &status("S1", 2, 8)]);
    }

    #[test]
    fn test_last_per_station_unique_input_unchanged() {
        let rows = vec![status("S1", 1, 9), status("S2", 4, 4)];
        let kept = last_per_station(&rows, |s| s.station_id.as_str());

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].station_id, "S1");
    }
}
