// src/models/station.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive station metadata, overwritten wholesale on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub station_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub capacity: i32,
    /// When this record was fetched
    pub last_updated: DateTime<Utc>,
}

/// An instantaneous observation of one station.
///
/// Flags are plain booleans; wire-level `0/1` integers are normalized during
/// decode so that comparisons never see two encodings of the same state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationStatus {
    pub station_id: String,
    pub num_bikes_available: i32,
    pub num_ebikes_available: i32,
    pub num_docks_available: i32,
    pub is_installed: bool,
    pub is_renting: bool,
    pub is_returning: bool,
}

impl StationStatus {
    /// Compare the six observable fields, ignoring identity.
    pub fn same_observation(&self, other: &StationStatus) -> bool {
        self.num_bikes_available == other.num_bikes_available
            && self.num_ebikes_available == other.num_ebikes_available
            && self.num_docks_available == other.num_docks_available
            && self.is_installed == other.is_installed
            && self.is_renting == other.is_renting
            && self.is_returning == other.is_returning
    }
}

/// Current status per station id.
pub type StatusSnapshot = HashMap<String, StationStatus>;

/// A decoded status poll together with its verbatim wire payload.
#[derive(Debug, Clone)]
pub struct StatusFeed {
    /// Feed-wide `last_updated`, shared by every station in the poll
    pub observed_at: DateTime<Utc>,
    pub stations: Vec<StationStatus>,
    pub raw: Vec<u8>,
}

/// Row counts of the three tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub stations: i64,
    pub current_status: i64,
    pub history: i64,
}

#[cfg(test)]
pub(crate) fn status(id: &str, bikes: i32, docks: i32) -> StationStatus {
    StationStatus {
        station_id: id.to_string(),
        num_bikes_available: bikes,
        num_ebikes_available: 0,
        num_docks_available: docks,
        is_installed: true,
        is_renting: true,
        is_returning: true,
    }
}
