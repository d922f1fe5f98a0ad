// src/lib.rs

//! GBFS station telemetry collector.
//!
//! Polls a bike-share GBFS feed, keeps a current-status snapshot per station,
//! appends a history row only when a station's observable state changes, and
//! archives every raw status payload.

pub mod config;
pub mod error;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
