//! Service layer for the collector.
//!
//! - GBFS feed fetching (`GbfsClient`)

mod feed;

pub use feed::{FeedSource, GbfsClient, INFORMATION_FEED, STATUS_FEED, decode_status};
