// src/error.rs

//! Unified error handling for the collector.

use std::fmt;

use thiserror::Error;

use crate::pipeline::RunStep;

/// Result type alias for collector operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or mismatched bearer token
    #[error("Unauthorized")]
    Unauthorized,

    /// Network, HTTP status or decode failure on one of the GBFS feeds
    #[error("Feed {feed} unavailable: {message}")]
    FeedUnavailable { feed: String, message: String },

    /// Current status snapshot could not be read
    #[error("Snapshot unavailable: {0}")]
    SnapshotUnavailable(String),

    /// Raw payload could not be written to cold storage
    #[error("Archival failed: {0}")]
    ArchivalFailed(String),

    /// A write batch was rolled back
    #[error("Persistence failed for {batch} batch: {message}")]
    PersistenceFailed { batch: String, message: String },

    /// A fatal failure at a specific step of a collection run
    #[error("{step} failed: {source}")]
    Run {
        step: RunStep,
        #[source]
        source: Box<AppError>,
    },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database driver error outside a write batch
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a feed error for the named feed.
    pub fn feed(feed: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::FeedUnavailable {
            feed: feed.into(),
            message: message.to_string(),
        }
    }

    /// Create a persistence error for the named batch.
    pub fn persistence(batch: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::PersistenceFailed {
            batch: batch.into(),
            message: message.to_string(),
        }
    }

    /// Attach the failing run step.
    pub fn at(self, step: RunStep) -> Self {
        Self::Run {
            step,
            source: Box::new(self),
        }
    }

    /// The step a run failed at, if this is a run failure.
    pub fn step(&self) -> Option<RunStep> {
        match self {
            Self::Run { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether the root cause is an authorization failure.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Unauthorized => true,
            Self::Run { source, .. } => source.is_unauthorized(),
            _ => false,
        }
    }
}
