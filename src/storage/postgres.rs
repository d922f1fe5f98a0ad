//! Postgres station store.
//!
//! The pool connects lazily: building a store is cheap and a warm serverless
//! instance keeps reusing the same pool. Each batch acquires its own pooled
//! connection, so overlapping invocations never share a transaction.

use std::time::Duration;

use sqlx::Postgres;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::error::Result;
use crate::models::DatabaseConfig;
use crate::storage::sql::impl_station_store;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgres");

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Build a lazily connected pool; no connection is made until first use.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url)?;
        Ok(Self { pool })
    }
}

impl_station_store!(PgStore, Postgres, MIGRATOR);
