// src/models/gbfs.rs

//! GBFS wire format.
//!
//! Both feeds share the envelope `{last_updated, ttl, data: {stations}}`.
//! Feeds in the wild disagree on a few encodings, so decoding normalizes:
//! - operational flags may be `0/1` or `true/false`
//! - station ids may be strings or integers
//! - `num_ebikes_available` may be absent

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

use super::{StationMetadata, StationStatus};

/// Top-level GBFS document.
#[derive(Debug, Deserialize)]
pub struct GbfsEnvelope<T> {
    pub last_updated: i64,
    #[serde(default)]
    pub ttl: i64,
    pub data: StationList<T>,
}

impl<T> GbfsEnvelope<T> {
    /// `last_updated` as a UTC timestamp.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.last_updated, 0).single()
    }
}

#[derive(Debug, Deserialize)]
pub struct StationList<T> {
    pub stations: Vec<T>,
}

/// One entry of `station_status.json`.
#[derive(Debug, Deserialize)]
pub struct StatusRecord {
    #[serde(deserialize_with = "station_id")]
    pub station_id: String,
    pub num_bikes_available: i32,
    #[serde(default)]
    pub num_ebikes_available: i32,
    pub num_docks_available: i32,
    #[serde(deserialize_with = "flag")]
    pub is_installed: bool,
    #[serde(deserialize_with = "flag")]
    pub is_renting: bool,
    #[serde(deserialize_with = "flag")]
    pub is_returning: bool,
    #[serde(default)]
    pub last_reported: Option<i64>,
}

impl From<StatusRecord> for StationStatus {
    fn from(record: StatusRecord) -> Self {
        Self {
            station_id: record.station_id,
            num_bikes_available: record.num_bikes_available,
            num_ebikes_available: record.num_ebikes_available,
            num_docks_available: record.num_docks_available,
            is_installed: record.is_installed,
            is_renting: record.is_renting,
            is_returning: record.is_returning,
        }
    }
}

/// One entry of `station_information.json`.
#[derive(Debug, Deserialize)]
pub struct InformationRecord {
    #[serde(deserialize_with = "station_id")]
    pub station_id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub capacity: i32,
}

impl InformationRecord {
    pub fn into_metadata(self, fetched_at: DateTime<Utc>) -> StationMetadata {
        StationMetadata {
            station_id: self.station_id,
            name: self.name,
            lat: self.lat,
            lon: self.lon,
            capacity: self.capacity,
            last_updated: fetched_at,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagRepr {
    Bool(bool),
    Int(i64),
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match FlagRepr::deserialize(deserializer)? {
        FlagRepr::Bool(b) => b,
        FlagRepr::Int(n) => n != 0,
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Int(i64),
}

fn station_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Text(s) => s,
        IdRepr::Int(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS_V1: &str = r#"{
        "last_updated": 1735689600,
        "ttl": 5,
        "data": {"stations": [{
            "station_id": "7000",
            "num_bikes_available": 3,
            "num_ebikes_available": 1,
            "num_docks_available": 5,
            "is_installed": 1,
            "is_renting": 1,
            "is_returning": 0,
            "last_reported": 1735689590
        }]}
    }"#;

    #[test]
    fn test_decode_integer_flags() {
        let doc: GbfsEnvelope<StatusRecord> = serde_json::from_str(STATUS_V1).unwrap();
        assert_eq!(doc.ttl, 5);
        assert_eq!(doc.observed_at().unwrap().timestamp(), 1735689600);

        let status: StationStatus = doc.data.stations.into_iter().next().unwrap().into();
        assert_eq!(status.station_id, "7000");
        assert!(status.is_installed);
        assert!(status.is_renting);
        assert!(!status.is_returning);
    }

    #[test]
    fn test_integer_and_boolean_flags_agree() {
        let v2 = STATUS_V1
            .replace("\"is_installed\": 1", "\"is_installed\": true")
            .replace("\"is_renting\": 1", "\"is_renting\": true")
            .replace("\"is_returning\": 0", "\"is_returning\": false");

        let a: GbfsEnvelope<StatusRecord> = serde_json::from_str(STATUS_V1).unwrap();
        let b: GbfsEnvelope<StatusRecord> = serde_json::from_str(&v2).unwrap();
        let a: StationStatus = a.data.stations.into_iter().next().unwrap().into();
        let b: StationStatus = b.data.stations.into_iter().next().unwrap().into();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_ebikes_and_numeric_id() {
        let json = r#"{"last_updated": 1, "data": {"stations": [{
            "station_id": 42, "num_bikes_available": 0, "num_docks_available": 9,
            "is_installed": 1, "is_renting": 0, "is_returning": 1
        }]}}"#;
        let doc: GbfsEnvelope<StatusRecord> = serde_json::from_str(json).unwrap();
        let record = &doc.data.stations[0];
        assert_eq!(record.station_id, "42");
        assert_eq!(record.num_ebikes_available, 0);
        assert!(record.last_reported.is_none());
    }

    #[test]
    fn test_decode_information() {
        let json = r#"{"last_updated": 1, "ttl": 10, "data": {"stations": [{
            "station_id": "7000", "name": "Fort York Blvd / Capreol Ct",
            "lat": 43.639832, "lon": -79.395954, "capacity": 35
        }]}}"#;
        let doc: GbfsEnvelope<InformationRecord> = serde_json::from_str(json).unwrap();
        let now = Utc::now();
        let meta = doc.data.stations.into_iter().next().unwrap().into_metadata(now);
        assert_eq!(meta.capacity, 35);
        assert_eq!(meta.last_updated, now);
    }

    #[test]
    fn test_malformed_flag_rejected() {
        let json = STATUS_V1.replace("\"is_renting\": 1", "\"is_renting\": \"yes\"");
        assert!(serde_json::from_str::<GbfsEnvelope<StatusRecord>>(&json).is_err());
    }
}
