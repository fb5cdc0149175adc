//! Cache Module
//!
//! Block-based storage engine with memcached command semantics.
//!
//! Layers, leaves first: entry codec, block allocator, partition index,
//! partitioned store, and the coordinator that implements the commands.

mod block;
mod coordinator;
mod entry;
mod hash;
mod partition;
mod stats;
mod store;


// Re-export public types
pub use block::{BlockAllocator, Region};
pub use coordinator::{Cache, DelayedDelete, DeleteResponse, IncrDecrResponse, StoreResponse};
pub use entry::{current_time_secs, expiry_from_exptime, CacheEntry, THIRTY_DAYS_SECS};
pub use partition::{Partition, PartitionIndex};
pub use stats::{CacheStats, StatsSnapshot, VERSION};
pub use store::PartitionedStore;

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 250;

/// Maximum allowed value size in bytes
pub const MAX_VALUE_SIZE: usize = 1024 * 1024; // 1 MB
