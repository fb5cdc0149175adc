//! Mini Memcached - a memcached-compatible in-process cache engine
//!
//! Entries live in fixed-capacity, block-allocated partitions; the cache
//! layer adds CAS versioning, conditional stores, counters and delayed
//! deletion, and a small JSON API exposes the commands over HTTP.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use tasks::spawn_scavenger_task;
