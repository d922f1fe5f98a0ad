//! S3-compatible archive for raw status payloads.
//!
//! Works against AWS S3 or any S3-compatible endpoint (Cloudflare R2 uses
//! `endpoint = https://<account>.r2.cloudflarestorage.com`, `region = auto`).

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{AppError, Result};
use crate::models::ArchiveConfig;
use crate::storage::{ArchiveSink, archive_key};

/// S3-based archive. Keys are timestamp-addressed, so a retried poll
/// overwrites its own object.
#[derive(Clone)]
pub struct S3Archive {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Archive {
    /// Create a new S3 archive instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create an S3 archive from configuration and the ambient AWS credentials.
    pub async fn from_config(config: &ArchiveConfig) -> Result<Self> {
        let bucket = config
            .bucket
            .clone()
            .ok_or_else(|| AppError::config("archive.bucket is not set"))?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        Ok(Self::new(client, bucket, config.prefix.clone()))
    }
}

#[async_trait]
impl ArchiveSink for S3Archive {
    async fn archive(&self, raw: &[u8], observed_at: DateTime<Utc>) -> Result<String> {
        let key = archive_key(&self.prefix, observed_at);
        let digest = hex::encode(Sha256::digest(raw));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(raw.to_vec()))
            .content_type("application/json")
            .metadata("sha256", digest)
            .send()
            .await
            .map_err(|e| AppError::ArchivalFailed(format!("s3://{}/{}: {}", self.bucket, key, e)))?;

        let location = format!("s3://{}/{}", self.bucket, key);
        info!("Archived {} bytes to {}", raw.len(), location);
        Ok(location)
    }
}
