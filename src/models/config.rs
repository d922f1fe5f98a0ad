//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream GBFS endpoints and HTTP behavior
    #[serde(default)]
    pub feed: FeedConfig,

    /// Database connection and pool settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Cold storage for raw status payloads
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Invocation authorization
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("feed.status_url", &self.feed.status_url),
            ("feed.information_url", &self.feed.information_url),
        ] {
            Url::parse(value)
                .map_err(|e| AppError::validation(format!("{name} is not a valid URL: {e}")))?;
        }
        if self.feed.user_agent.trim().is_empty() {
            return Err(AppError::validation("feed.user_agent is empty"));
        }
        if self.feed.timeout_secs == 0 {
            return Err(AppError::validation("feed.timeout_secs must be > 0"));
        }
        if self.database.url.trim().is_empty() {
            return Err(AppError::validation("database.url is empty"));
        }
        if self.database.max_connections == 0 {
            return Err(AppError::validation("database.max_connections must be > 0"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::validation(
                "database.min_connections must not exceed max_connections",
            ));
        }
        match self.archive.backend {
            ArchiveBackend::S3 if self.archive.bucket.is_none() => {
                return Err(AppError::validation("archive.bucket is required for s3"));
            }
            ArchiveBackend::Local if self.archive.local_dir.is_none() => {
                return Err(AppError::validation("archive.local_dir is required for local"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Upstream feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "defaults::status_url")]
    pub status_url: String,

    #[serde(default = "defaults::information_url")]
    pub information_url: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            status_url: defaults::status_url(),
            information_url: defaults::information_url(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Database settings. Pool limits are sized for short serverless invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...`
    #[serde(default = "defaults::database_url")]
    pub url: String,

    #[serde(default = "defaults::max_connections")]
    pub max_connections: u32,

    #[serde(default)]
    pub min_connections: u32,

    #[serde(default = "defaults::max_lifetime")]
    pub max_lifetime_secs: u64,

    #[serde(default = "defaults::acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: defaults::database_url(),
            max_connections: defaults::max_connections(),
            min_connections: 0,
            max_lifetime_secs: defaults::max_lifetime(),
            acquire_timeout_secs: defaults::acquire_timeout(),
        }
    }
}

/// Where raw status payloads are archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackend {
    S3,
    Local,
    #[default]
    Disabled,
}

impl std::str::FromStr for ArchiveBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" | "r2" => Ok(Self::S3),
            "local" => Ok(Self::Local),
            "disabled" | "none" | "off" => Ok(Self::Disabled),
            other => Err(AppError::config(format!("unknown archive backend '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub backend: ArchiveBackend,

    #[serde(default)]
    pub bucket: Option<String>,

    /// Key prefix inside the bucket or directory
    #[serde(default = "defaults::archive_prefix")]
    pub prefix: String,

    /// S3-compatible endpoint override (e.g. Cloudflare R2)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            backend: ArchiveBackend::default(),
            bucket: None,
            prefix: defaults::archive_prefix(),
            endpoint: None,
            region: None,
            local_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret expected as `Authorization: Bearer <secret>`
    #[serde(default)]
    pub cron_secret: Option<String>,
}

mod defaults {
    pub fn status_url() -> String {
        "https://tor.publicbikesystem.net/ube/gbfs/v1/en/station_status.json".into()
    }
    pub fn information_url() -> String {
        "https://tor.publicbikesystem.net/ube/gbfs/v1/en/station_information.json".into()
    }
    pub fn user_agent() -> String {
        "gbfs-collector/0.1".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    pub fn database_url() -> String {
        "sqlite:data/collector.db".into()
    }
    pub fn max_connections() -> u32 {
        5
    }
    pub fn max_lifetime() -> u64 {
        30 * 60
    }
    pub fn acquire_timeout() -> u64 {
        10
    }

    pub fn archive_prefix() -> String {
        "raw".into()
    }
}
