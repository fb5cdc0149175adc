//! Partitioned Store Module
//!
//! Map-like storage that shards keys across independent partitions. Every
//! operation touches exactly one partition and runs under that partition's
//! lock, so operations on different partitions proceed in parallel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLockUpgradableReadGuard;
use tracing::debug;

use crate::cache::block::Region;
use crate::cache::entry::CacheEntry;
use crate::cache::hash::{index_for, PARTITION_SEED};
use crate::cache::partition::{Partition, PartitionIndex};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Partitioned Store ==
/// Storage engine sharded over `N` partitions, `N` a power of two.
#[derive(Debug)]
pub struct PartitionedStore {
    partitions: Vec<Partition>,
    /// Ceiling on stored items, 0 = unbounded
    max_items: usize,
    items: AtomicUsize,
}

impl PartitionedStore {
    // == Constructor ==
    /// Creates `partition_count` partitions sharing `total_bytes` evenly.
    pub fn new(
        partition_count: usize,
        total_bytes: u64,
        block_size: u32,
        buckets_per_partition: usize,
        max_items: usize,
    ) -> Result<Self> {
        if partition_count == 0 || !partition_count.is_power_of_two() {
            return Err(CacheError::InvalidRequest(format!(
                "Partition count {} is not a power of two",
                partition_count
            )));
        }

        let partition_bytes = total_bytes / partition_count as u64;
        let partitions = (0..partition_count)
            .map(|_| Partition::new(partition_bytes, block_size, buckets_per_partition))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            partitions,
            max_items,
            items: AtomicUsize::new(0),
        })
    }

    /// Creates a store sized by the server configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.partitions,
            config.max_bytes,
            config.block_size,
            config.partition_buckets,
            config.max_items,
        )
    }

    fn partition_for(&self, key: &str) -> &Partition {
        &self.partitions[index_for(key, PARTITION_SEED, self.partitions.len())]
    }

    // == Item Accounting ==
    fn reserve_item(&self) -> Result<()> {
        if self.max_items == 0 {
            self.items.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        self.items
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_items).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| CacheError::ItemLimit(self.max_items))
    }

    fn release_items(&self, count: usize) {
        self.items.fetch_sub(count, Ordering::Relaxed);
    }

    /// Inserts into a partition that has no entry for `key`.
    fn insert_new(&self, index: &mut PartitionIndex, key: &str, entry: &CacheEntry) -> Result<()> {
        self.reserve_item()?;
        if let Err(err) = index.add(key, entry) {
            self.release_items(1);
            return Err(err);
        }
        Ok(())
    }

    // == Get ==
    pub fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let index = self.partition_for(key).read();
        Ok(index.find_entry(key)?.map(|(_, entry)| entry))
    }

    // == Contains Key ==
    pub fn contains_key(&self, key: &str) -> Result<bool> {
        self.partition_for(key).read().has(key)
    }

    // == Get Multi ==
    /// Looks up several keys, taking each partition's lock once.
    ///
    /// Only found entries are returned; their order is unspecified.
    pub fn get_multi<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<CacheEntry>> {
        let mut by_partition: Vec<Vec<&str>> = vec![Vec::new(); self.partitions.len()];
        for key in keys {
            let key = key.as_ref();
            by_partition[index_for(key, PARTITION_SEED, self.partitions.len())].push(key);
        }

        let mut found = Vec::with_capacity(keys.len());
        for (partition, keys) in self.partitions.iter().zip(by_partition) {
            if keys.is_empty() {
                continue;
            }
            let index = partition.read();
            for key in keys {
                if let Some((_, entry)) = index.find_entry(key)? {
                    found.push(entry);
                }
            }
        }
        Ok(found)
    }

    // == Put ==
    /// Stores `entry` under `key`, returning the previous entry.
    ///
    /// The old region is freed before the new one is allocated. If the new
    /// entry does not fit, the old entry is written back and the error is
    /// returned, so a failed put never loses data.
    pub fn put(&self, key: &str, entry: &CacheEntry) -> Result<Option<CacheEntry>> {
        let guard = self.partition_for(key).upgradable_read();
        let existing = guard.find_entry(key)?;
        let mut index = RwLockUpgradableReadGuard::upgrade(guard);

        match existing {
            Some((region, old)) => {
                swap(&mut index, key, region, &old, entry)?;
                Ok(Some(old))
            }
            None => {
                self.insert_new(&mut index, key, entry)?;
                Ok(None)
            }
        }
    }

    // == Put If Absent ==
    /// Inserts only when `key` has no entry; otherwise returns the current one.
    pub fn put_if_absent(&self, key: &str, entry: &CacheEntry) -> Result<Option<CacheEntry>> {
        let guard = self.partition_for(key).upgradable_read();
        if let Some((_, current)) = guard.find_entry(key)? {
            return Ok(Some(current));
        }

        let mut index = RwLockUpgradableReadGuard::upgrade(guard);
        self.insert_new(&mut index, key, entry)?;
        Ok(None)
    }

    // == Replace ==
    /// Replaces an existing entry, returning the previous one. Absent keys
    /// are left absent and `None` is returned.
    pub fn replace(&self, key: &str, entry: &CacheEntry) -> Result<Option<CacheEntry>> {
        let guard = self.partition_for(key).upgradable_read();
        let Some((region, old)) = guard.find_entry(key)? else {
            return Ok(None);
        };

        let mut index = RwLockUpgradableReadGuard::upgrade(guard);
        swap(&mut index, key, region, &old, entry)?;
        Ok(Some(old))
    }

    /// Replaces the entry only if it still equals `expected`.
    pub fn replace_if_equal(
        &self,
        key: &str,
        expected: &CacheEntry,
        entry: &CacheEntry,
    ) -> Result<bool> {
        let guard = self.partition_for(key).upgradable_read();
        let Some((region, current)) = guard.find_entry(key)? else {
            return Ok(false);
        };
        if current != *expected {
            return Ok(false);
        }

        let mut index = RwLockUpgradableReadGuard::upgrade(guard);
        swap(&mut index, key, region, &current, entry)?;
        Ok(true)
    }

    // == Remove ==
    /// Removes `key`, returning the entry it held.
    pub fn remove(&self, key: &str) -> Result<Option<CacheEntry>> {
        let guard = self.partition_for(key).upgradable_read();
        let Some((region, old)) = guard.find_entry(key)? else {
            return Ok(None);
        };

        let mut index = RwLockUpgradableReadGuard::upgrade(guard);
        index.remove(key, region)?;
        self.release_items(1);
        Ok(Some(old))
    }

    /// Removes `key` only if its entry still equals `expected`.
    pub fn remove_if_equal(&self, key: &str, expected: &CacheEntry) -> Result<bool> {
        let guard = self.partition_for(key).upgradable_read();
        let Some((region, current)) = guard.find_entry(key)? else {
            return Ok(false);
        };
        if current != *expected {
            return Ok(false);
        }

        let mut index = RwLockUpgradableReadGuard::upgrade(guard);
        index.remove(key, region)?;
        self.release_items(1);
        Ok(true)
    }

    // == Size ==
    pub fn len(&self) -> usize {
        self.items.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // == Clear ==
    pub fn clear(&self) {
        for partition in &self.partitions {
            let mut index = partition.write();
            let cleared = index.len();
            index.clear();
            self.release_items(cleared);
        }
    }

    // == Key Set ==
    pub fn key_set(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::with_capacity(self.len());
        for partition in &self.partitions {
            keys.extend(partition.read().keys()?);
        }
        Ok(keys)
    }

    // == Memory ==
    /// Sum of every partition's arena size.
    pub fn memory_capacity(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| p.read().store_size_bytes())
            .sum()
    }

    /// Bytes held by allocated blocks across all partitions.
    pub fn memory_used(&self) -> u64 {
        self.partitions.iter().map(|p| p.read().used_bytes()).sum()
    }

    // == Close ==
    /// Clears every partition and releases the arenas.
    pub fn close(&self) {
        self.clear();
        for partition in &self.partitions {
            partition.close();
        }
    }
}

/// Replaces the entry at `region` with `entry`, restoring `old` if the new
/// entry cannot be allocated. Restoring always fits: it reuses the run just
/// freed while the exclusive lock is still held.
fn swap(
    index: &mut PartitionIndex,
    key: &str,
    region: Region,
    old: &CacheEntry,
    entry: &CacheEntry,
) -> Result<()> {
    index.remove(key, region)?;
    if let Err(err) = index.add(key, entry) {
        debug!(key, error = %err, "replacement did not fit, restoring previous entry");
        index.add(key, old)?;
        return Err(err);
    }
    Ok(())
}
