//! Partition Module
//!
//! One shard of the store: a block allocator plus a bucket table that maps
//! keys to the regions holding their encoded entries.
//!
//! Each bucket is a flat byte list of descriptor records:
//!
//! ```text
//! u32 record_len | u32 size | u32 used_blocks | u32 start_block
//! | i64 expiry | i64 timestamp | u32 key_len | key bytes
//! ```
//!
//! `record_len` counts everything after itself. Records are appended on
//! insert; removal rewrites the bucket without the removed record.

use std::collections::HashSet;

use bytes::{Buf, BufMut};
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};

use crate::cache::block::{BlockAllocator, Region};
use crate::cache::entry::CacheEntry;
use crate::cache::hash::{index_for, BUCKET_SEED};
use crate::error::{CacheError, Result};

const DESCRIPTOR_LEN: usize = 4 + 4 + 4 + 8 + 8 + 4;

// == Bucket Records ==
struct BucketRecord<'a> {
    /// Byte offset of the record (including its length prefix)
    offset: usize,
    /// Total bytes including the length prefix
    len: usize,
    size: u32,
    used_blocks: u32,
    start_block: u32,
    expiry: i64,
    timestamp: i64,
    key: &'a [u8],
}

impl BucketRecord<'_> {
    fn region(&self) -> Region {
        Region {
            size: self.size,
            used_blocks: self.used_blocks,
            start_block: self.start_block,
            expiry: self.expiry,
            timestamp: self.timestamp,
        }
    }
}

/// Walks the records of one bucket, each read from its own offset.
struct BucketScan<'a> {
    bucket: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for BucketScan<'a> {
    type Item = Result<BucketRecord<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.bucket.len() {
            return None;
        }

        let offset = self.pos;
        let bucket: &'a [u8] = self.bucket;
        let rest = &bucket[offset..];
        if rest.len() < 4 + DESCRIPTOR_LEN {
            self.pos = self.bucket.len();
            return Some(Err(CacheError::Corruption(format!(
                "bucket record at {} is truncated",
                offset
            ))));
        }

        let mut buf = rest;
        let record_len = buf.get_u32() as usize;
        let size = buf.get_u32();
        let used_blocks = buf.get_u32();
        let start_block = buf.get_u32();
        let expiry = buf.get_i64();
        let timestamp = buf.get_i64();
        let key_len = buf.get_u32() as usize;

        if record_len != DESCRIPTOR_LEN + key_len || buf.remaining() < key_len {
            self.pos = self.bucket.len();
            return Some(Err(CacheError::Corruption(format!(
                "bucket record at {} has inconsistent length {}",
                offset, record_len
            ))));
        }

        let len = 4 + record_len;
        self.pos += len;
        Some(Ok(BucketRecord {
            offset,
            len,
            size,
            used_blocks,
            start_block,
            expiry,
            timestamp,
            key: &buf[..key_len],
        }))
    }
}

fn scan(bucket: &[u8]) -> BucketScan<'_> {
    BucketScan { bucket, pos: 0 }
}

// == Partition Index ==
/// The unlocked contents of a partition. Reached through `Partition` guards.
#[derive(Debug)]
pub struct PartitionIndex {
    buckets: Vec<Vec<u8>>,
    blocks: BlockAllocator,
    items: usize,
}

impl PartitionIndex {
    fn bucket_of(&self, key: &str) -> usize {
        index_for(key, BUCKET_SEED, self.buckets.len())
    }

    fn locate(&self, key: &str) -> Result<Option<BucketRecord<'_>>> {
        let bucket = &self.buckets[self.bucket_of(key)];
        for record in scan(bucket) {
            let record = record?;
            if record.key.len() == key.len() && record.key == key.as_bytes() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    // == Find ==
    /// Returns the region holding `key`, if any.
    pub fn find(&self, key: &str) -> Result<Option<Region>> {
        Ok(self.locate(key)?.map(|record| record.region()))
    }

    // == Has ==
    pub fn has(&self, key: &str) -> Result<bool> {
        Ok(self.locate(key)?.is_some())
    }

    /// Decodes the entry stored in `region`.
    pub fn read(&self, region: &Region) -> Result<CacheEntry> {
        let record = self.blocks.get(region.start_block, region.size)?;
        CacheEntry::decode(record)
    }

    /// Finds and decodes the entry for `key`.
    pub fn find_entry(&self, key: &str) -> Result<Option<(Region, CacheEntry)>> {
        match self.find(key)? {
            Some(region) => {
                let entry = self.read(&region)?;
                Ok(Some((region, entry)))
            }
            None => Ok(None),
        }
    }

    // == Add ==
    /// Copies `entry` into a new region and indexes it under `key`.
    ///
    /// The caller must have removed any previous region for `key`.
    pub fn add(&mut self, key: &str, entry: &CacheEntry) -> Result<Region> {
        let encoded_len = entry.encoded_len();
        let size = u32::try_from(encoded_len).map_err(|_| CacheError::OutOfSpace {
            requested: encoded_len,
            free: self.blocks.free_bytes() as usize,
        })?;

        let timestamp = chrono::Utc::now().timestamp_millis();
        let region = self.blocks.alloc(size, entry.expire, timestamp)?;
        entry.encode_into(self.blocks.get_mut(region.start_block, region.size)?);

        let bucket = self.bucket_of(key);
        let out = &mut self.buckets[bucket];
        out.reserve(4 + DESCRIPTOR_LEN + key.len());
        out.put_u32((DESCRIPTOR_LEN + key.len()) as u32);
        out.put_u32(region.size);
        out.put_u32(region.used_blocks);
        out.put_u32(region.start_block);
        out.put_i64(region.expiry);
        out.put_i64(region.timestamp);
        out.put_u32(key.len() as u32);
        out.put_slice(key.as_bytes());

        self.items += 1;
        Ok(region)
    }

    // == Remove ==
    /// Frees `region` and drops the descriptor for `key` from its bucket.
    pub fn remove(&mut self, key: &str, region: Region) -> Result<()> {
        let bucket = self.bucket_of(key);
        let (offset, len) = {
            let record = self.locate(key)?.ok_or_else(|| {
                CacheError::Corruption(format!("key '{}' is not indexed in its bucket", key))
            })?;
            if record.start_block != region.start_block {
                return Err(CacheError::Corruption(format!(
                    "key '{}' indexed at block {} but region starts at {}",
                    key, record.start_block, region.start_block
                )));
            }
            (record.offset, record.len)
        };

        self.blocks.free(region)?;

        let old = &self.buckets[bucket];
        let mut rewritten = Vec::with_capacity(old.len() - len);
        rewritten.extend_from_slice(&old[..offset]);
        rewritten.extend_from_slice(&old[offset + len..]);
        self.buckets[bucket] = rewritten;

        self.items -= 1;
        Ok(())
    }

    // == Keys ==
    /// Collects every key, decoding only the key bytes of each record.
    pub fn keys(&self) -> Result<HashSet<String>> {
        let mut keys = HashSet::with_capacity(self.items);
        for bucket in &self.buckets {
            for record in scan(bucket) {
                let record = record?;
                let key = std::str::from_utf8(record.key).map_err(|_| {
                    CacheError::Corruption("indexed key is not valid UTF-8".to_string())
                })?;
                keys.insert(key.to_string());
            }
        }
        Ok(keys)
    }

    // == Clear ==
    /// Drops every record and releases all blocks.
    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.blocks.clear();
        self.items = 0;
    }

    pub fn len(&self) -> usize {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn store_size_bytes(&self) -> u64 {
        self.blocks.store_size_bytes()
    }

    pub fn used_bytes(&self) -> u64 {
        self.blocks.store_size_bytes() - self.blocks.free_bytes()
    }

    fn close(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Vec::new();
        }
        self.items = 0;
        self.blocks.close();
    }
}

// == Partition ==
/// A partition index behind its reader/writer lock.
///
/// Readers share the lock. Writers locate under an upgradable read and
/// upgrade to exclusive before mutating, so the find-then-mutate sequence is
/// atomic while plain readers keep running until the upgrade.
#[derive(Debug)]
pub struct Partition {
    index: RwLock<PartitionIndex>,
}

impl Partition {
    // == Constructor ==
    pub fn new(size_bytes: u64, block_size: u32, bucket_count: usize) -> Result<Self> {
        if !bucket_count.is_power_of_two() {
            return Err(CacheError::InvalidRequest(format!(
                "Bucket count {} is not a power of two",
                bucket_count
            )));
        }

        Ok(Self {
            index: RwLock::new(PartitionIndex {
                buckets: vec![Vec::new(); bucket_count],
                blocks: BlockAllocator::new(size_bytes, block_size)?,
                items: 0,
            }),
        })
    }

    pub fn read(&self) -> RwLockReadGuard<'_, PartitionIndex> {
        self.index.read()
    }

    pub fn upgradable_read(&self) -> RwLockUpgradableReadGuard<'_, PartitionIndex> {
        self.index.upgradable_read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, PartitionIndex> {
        self.index.write()
    }

    /// Releases the arena. The partition holds nothing afterwards.
    pub fn close(&self) {
        self.index.write().close();
    }
}
