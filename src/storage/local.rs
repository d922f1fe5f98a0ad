//! Local filesystem archive.
//!
//! Mirrors the S3 key layout under a root directory, for development and
//! testing.
//!
//! ```text
//! {root}/
//! └── raw/
//!     └── station_status_<epoch>.json
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::{AppError, Result};
use crate::storage::{ArchiveSink, archive_key};

/// Distinguishes temp files of concurrent writes to the same key.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Local filesystem archive backend.
#[derive(Debug, Clone)]
pub struct LocalArchive {
    root_dir: PathBuf,
    prefix: String,
}

impl LocalArchive {
    /// Create a new LocalArchive rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            root_dir: root_dir.into(),
            prefix: prefix.to_string(),
        }
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension(format!(
            "{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }
}

#[async_trait]
impl ArchiveSink for LocalArchive {
    async fn archive(&self, raw: &[u8], observed_at: DateTime<Utc>) -> Result<String> {
        let key = archive_key(&self.prefix, observed_at);
        let path = self
            .write_bytes(&key, raw)
            .await
            .map_err(|e| AppError::ArchivalFailed(format!("{key}: {e}")))?;
        info!("Archived {} bytes to {}", raw.len(), path.display());
        Ok(path.display().to_string())
    }
}
