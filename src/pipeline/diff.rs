//! Change detection between the stored snapshot and a fresh status poll.
//!
//! A station is *changed* when it has no previous row or when any of its six
//! observable fields differ. Stations that vanish from the feed are neither
//! reported nor touched.

use crate::models::{StationStatus, StatusSnapshot};

/// Incoming statuses partitioned by whether they warrant a history row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changed: Vec<StationStatus>,
    pub unchanged: Vec<StationStatus>,
}

impl ChangeSet {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.changed.len() + self.unchanged.len()
    }
}

/// Partition `incoming` against `previous`, preserving feed order.
pub fn detect_changes(previous: &StatusSnapshot, incoming: &[StationStatus]) -> ChangeSet {
    let mut set = ChangeSet::default();
    for status in incoming {
        let same = previous
            .get(&status.station_id)
            .is_some_and(|prev| prev.same_observation(status));
        if same {
            set.unchanged.push(status.clone());
        } else {
            set.changed.push(status.clone());
        }
    }
    set
}
