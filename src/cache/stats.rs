//! Cache Statistics Module
//!
//! Runtime counters shared by every worker. Each counter is updated
//! independently with relaxed ordering; a snapshot taken under load may see
//! one counter a little ahead of another.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Version reported in statistics snapshots.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// == Cache Stats ==
/// Command and hit/miss counters plus the engine start time.
#[derive(Debug)]
pub struct CacheStats {
    get_cmds: AtomicU64,
    set_cmds: AtomicU64,
    get_hits: AtomicU64,
    get_misses: AtomicU64,
    started: DateTime<Utc>,
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStats {
    // == Constructor ==
    /// Creates zeroed counters and records the start time.
    pub fn new() -> Self {
        Self {
            get_cmds: AtomicU64::new(0),
            set_cmds: AtomicU64::new(0),
            get_hits: AtomicU64::new(0),
            get_misses: AtomicU64::new(0),
            started: Utc::now(),
        }
    }

    pub fn record_get(&self) {
        self.get_cmds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_set(&self) {
        self.set_cmds.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_hits(&self, count: u64) {
        self.get_hits.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_misses(&self, count: u64) {
        self.get_misses.fetch_add(count, Ordering::Relaxed);
    }

    pub fn get_cmds(&self) -> u64 {
        self.get_cmds.load(Ordering::Relaxed)
    }

    pub fn set_cmds(&self) -> u64 {
        self.set_cmds.load(Ordering::Relaxed)
    }

    pub fn get_hits(&self) -> u64 {
        self.get_hits.load(Ordering::Relaxed)
    }

    pub fn get_misses(&self) -> u64 {
        self.get_misses.load(Ordering::Relaxed)
    }

    /// Whole seconds since the counters were created.
    pub fn uptime_secs(&self) -> u64 {
        (Utc::now() - self.started).num_seconds().max(0) as u64
    }

    // == Snapshot ==
    /// Combines the counters with the store's current figures.
    pub fn snapshot(&self, curr_items: usize, limit_maxbytes: u64, current_bytes: u64) -> StatsSnapshot {
        let get_hits = self.get_hits();
        let get_misses = self.get_misses();
        let lookups = get_hits + get_misses;

        StatsSnapshot {
            version: VERSION.to_string(),
            time: Utc::now().timestamp(),
            uptime: self.uptime_secs(),
            get_cmds: self.get_cmds(),
            set_cmds: self.set_cmds(),
            get_hits,
            get_misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                get_hits as f64 / lookups as f64
            },
            curr_items,
            limit_maxbytes,
            current_bytes,
        }
    }
}

// == Stats Snapshot ==
/// Point-in-time statistics consumed by stats responders.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub version: String,
    /// Server time in epoch seconds
    pub time: i64,
    /// Seconds since start
    pub uptime: u64,
    pub get_cmds: u64,
    pub set_cmds: u64,
    pub get_hits: u64,
    pub get_misses: u64,
    /// get_hits / (get_hits + get_misses), 0 when nothing was looked up
    pub hit_rate: f64,
    /// Items currently stored
    pub curr_items: usize,
    /// Configured byte capacity
    pub limit_maxbytes: u64,
    /// Bytes held by allocated blocks
    pub current_bytes: u64,
}
