//! Collection pipeline.
//!
//! - `authorize`: shared-secret gate for invocations
//! - `detect_changes`: split a status poll into changed and unchanged stations
//! - `Collector`: sequence one run from fetch to persisted history

pub mod auth;
pub mod collect;
pub mod diff;

pub use auth::authorize;
pub use collect::{Collector, RunReport, RunStep};
pub use diff::{ChangeSet, detect_changes};
