//! Configuration Module
//!
//! Handles loading and validating engine and server configuration from
//! environment variables.

use std::env;
use std::str::FromStr;

use crate::error::{CacheError, Result};

// == Defaults ==
const DEFAULT_PARTITIONS: usize = 16;
const DEFAULT_BLOCK_SIZE: u32 = 8;
const DEFAULT_MAX_BYTES: u64 = 64 * 1024 * 1024;
const DEFAULT_PARTITION_BUCKETS: usize = 32 * 1024;
const DEFAULT_SCAVENGER_INTERVAL: u64 = 2;
const DEFAULT_SERVER_PORT: u16 = 11211;

/// Engine and server configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of independently locked partitions (power of two)
    pub partitions: usize,
    /// Allocation unit in bytes
    pub block_size: u32,
    /// Total byte capacity, split evenly across partitions
    pub max_bytes: u64,
    /// Item ceiling across the whole store, 0 = unbounded
    pub max_items: usize,
    /// Buckets in each partition's index (power of two)
    pub partition_buckets: usize,
    /// Seconds between delayed-delete sweeps
    pub scavenger_interval: u64,
    /// HTTP server port
    pub server_port: u16,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `PARTITIONS` - Partition count (default: 16)
    /// - `BLOCK_SIZE` - Block size in bytes (default: 8)
    /// - `MAX_BYTES` - Total capacity in bytes (default: 64 MiB)
    /// - `MAX_ITEMS` - Item ceiling, 0 for none (default: 0)
    /// - `PARTITION_BUCKETS` - Index buckets per partition (default: 32768)
    /// - `SCAVENGER_INTERVAL` - Delayed-delete sweep period in seconds (default: 2)
    /// - `SERVER_PORT` - HTTP server port (default: 11211)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        Self {
            partitions: env_or("PARTITIONS", DEFAULT_PARTITIONS),
            block_size: env_or("BLOCK_SIZE", DEFAULT_BLOCK_SIZE),
            max_bytes: env_or("MAX_BYTES", DEFAULT_MAX_BYTES),
            max_items: env_or("MAX_ITEMS", 0),
            partition_buckets: env_or("PARTITION_BUCKETS", DEFAULT_PARTITION_BUCKETS),
            scavenger_interval: env_or("SCAVENGER_INTERVAL", DEFAULT_SCAVENGER_INTERVAL),
            server_port: env_or("SERVER_PORT", DEFAULT_SERVER_PORT),
        }
    }

    /// Rejects layouts the store cannot be built with.
    pub fn validate(&self) -> Result<()> {
        if !self.partitions.is_power_of_two() {
            return Err(CacheError::InvalidRequest(format!(
                "partition count {} is not a power of two",
                self.partitions
            )));
        }
        if !self.partition_buckets.is_power_of_two() {
            return Err(CacheError::InvalidRequest(format!(
                "bucket count {} is not a power of two",
                self.partition_buckets
            )));
        }
        if self.block_size == 0 {
            return Err(CacheError::InvalidRequest("block size must be positive".into()));
        }
        if self.max_bytes / (self.partitions as u64) < u64::from(self.block_size) {
            return Err(CacheError::InvalidRequest(format!(
                "{} bytes cannot hold one {}-byte block per partition",
                self.max_bytes, self.block_size
            )));
        }
        if self.scavenger_interval == 0 {
            return Err(CacheError::InvalidRequest(
                "scavenger interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            partitions: DEFAULT_PARTITIONS,
            block_size: DEFAULT_BLOCK_SIZE,
            max_bytes: DEFAULT_MAX_BYTES,
            max_items: 0,
            partition_buckets: DEFAULT_PARTITION_BUCKETS,
            scavenger_interval: DEFAULT_SCAVENGER_INTERVAL,
            server_port: DEFAULT_SERVER_PORT,
        }
    }
}
