//! pingtrail - HTTP endpoint health-check collector.
//!
//! Probes a configured list of endpoints on a fixed interval, keeps the most
//! recent results in a bounded JSON log, and serves filtered, paginated views
//! with per-endpoint statistics.

pub mod config;
pub mod db;
pub mod probe;
pub mod query;
pub mod scheduler;
pub mod web;
