// src/models/mod.rs

//! Domain models for the collector.
//!
//! Station records as stored, the GBFS wire format they are decoded from,
//! and configuration structures.

mod config;
pub mod gbfs;
mod station;

// Re-export all public types
pub use config::{ArchiveBackend, ArchiveConfig, AuthConfig, Config, DatabaseConfig, FeedConfig};
pub use station::{StationMetadata, StationStatus, StatusFeed, StatusSnapshot, TableCounts};

#[cfg(test)]
pub(crate) use station::status;
