// src/services/feed.rs

//! GBFS feed client.
//!
//! Fetches `station_information.json` and `station_status.json`. Every
//! transport, HTTP status and decode failure surfaces as
//! [`AppError::FeedUnavailable`]; the caller decides whether it is fatal.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::gbfs::{GbfsEnvelope, InformationRecord, StatusRecord};
use crate::models::{FeedConfig, StationMetadata, StatusFeed};
use crate::utils::http::{create_async_client, fetch_bytes};

pub const INFORMATION_FEED: &str = "station_information";
pub const STATUS_FEED: &str = "station_status";

/// Source of station metadata and status polls.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch descriptive metadata for every station.
    async fn fetch_metadata(&self) -> Result<Vec<StationMetadata>>;

    /// Fetch the current status of every station, keeping the raw body.
    async fn fetch_status(&self) -> Result<StatusFeed>;
}

/// HTTP client for a fixed pair of GBFS endpoints.
pub struct GbfsClient {
    client: Client,
    information_url: String,
    status_url: String,
}

impl GbfsClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self::with_client(
            create_async_client(config)?,
            &config.information_url,
            &config.status_url,
        ))
    }

    pub fn with_client(
        client: Client,
        information_url: impl Into<String>,
        status_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            information_url: information_url.into(),
            status_url: status_url.into(),
        }
    }

    async fn get(&self, feed: &str, url: &str) -> Result<Vec<u8>> {
        debug!("GET {} ({})", url, feed);
        fetch_bytes(&self.client, url)
            .await
            .map_err(|e| AppError::feed(feed, e))
    }
}

#[async_trait]
impl FeedSource for GbfsClient {
    async fn fetch_metadata(&self) -> Result<Vec<StationMetadata>> {
        let body = self.get(INFORMATION_FEED, &self.information_url).await?;
        let fetched_at = Utc::now();
        let metadata = decode_information(&body)?
            .into_iter()
            .map(|record| record.into_metadata(fetched_at))
            .collect::<Vec<_>>();
        info!("Fetched {} stations metadata", metadata.len());
        Ok(metadata)
    }

    async fn fetch_status(&self) -> Result<StatusFeed> {
        let raw = self.get(STATUS_FEED, &self.status_url).await?;
        let feed = decode_status(raw)?;
        info!(
            "Fetched {} station statuses observed at {}",
            feed.stations.len(),
            feed.observed_at
        );
        Ok(feed)
    }
}

fn decode_information(body: &[u8]) -> Result<Vec<InformationRecord>> {
    let doc: GbfsEnvelope<InformationRecord> =
        serde_json::from_slice(body).map_err(|e| AppError::feed(INFORMATION_FEED, e))?;
    Ok(doc.data.stations)
}

/// Decode a status document, keeping `raw` verbatim for archival.
pub fn decode_status(raw: Vec<u8>) -> Result<StatusFeed> {
    let doc: GbfsEnvelope<StatusRecord> =
        serde_json::from_slice(&raw).map_err(|e| AppError::feed(STATUS_FEED, e))?;
    let observed_at = doc.observed_at().ok_or_else(|| {
        AppError::feed(
            STATUS_FEED,
            format!("last_updated {} out of range", doc.last_updated),
        )
    })?;
    let stations = doc.data.stations.into_iter().map(Into::into).collect();
    Ok(StatusFeed {
        observed_at,
        stations,
        raw,
    })
}
