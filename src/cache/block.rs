//! Block Allocator Module
//!
//! Manages a fixed-capacity byte arena split into equally sized blocks.
//! Allocations take a contiguous run of blocks; freed runs are coalesced
//! with their neighbours so that the free list stays short.

use std::collections::BTreeMap;

use crate::error::{CacheError, Result};

// == Region ==
/// Handle to an allocated run of blocks.
///
/// A region is deliberately neither `Copy` nor `Clone`: `free` consumes it,
/// so a handle cannot be used after it has been returned to the allocator.
#[derive(Debug, PartialEq, Eq)]
pub struct Region {
    /// Logical bytes in use
    pub size: u32,
    /// Number of blocks reserved
    pub used_blocks: u32,
    /// First block of the run
    pub start_block: u32,
    /// Expiry of the entry stored in the region
    pub expiry: i64,
    /// Allocation time in epoch milliseconds
    pub timestamp: i64,
}

// == Block Allocator ==
/// First-fit allocator over a single owned arena.
#[derive(Debug)]
pub struct BlockAllocator {
    arena: Box<[u8]>,
    block_size: u32,
    total_blocks: u32,
    free_blocks: u32,
    /// Free runs keyed by start block, value is the run length
    free_runs: BTreeMap<u32, u32>,
}

impl BlockAllocator {
    // == Constructor ==
    /// Creates an arena of `size_bytes` rounded down to whole blocks.
    pub fn new(size_bytes: u64, block_size: u32) -> Result<Self> {
        if block_size == 0 {
            return Err(CacheError::InvalidRequest(
                "Block size must be greater than zero".to_string(),
            ));
        }

        let total_blocks = u32::try_from(size_bytes / u64::from(block_size)).map_err(|_| {
            CacheError::InvalidRequest(format!(
                "{} bytes in blocks of {} exceeds the addressable block count",
                size_bytes, block_size
            ))
        })?;

        let arena_len = total_blocks as usize * block_size as usize;
        let mut allocator = Self {
            arena: vec![0u8; arena_len].into_boxed_slice(),
            block_size,
            total_blocks,
            free_blocks: 0,
            free_runs: BTreeMap::new(),
        };
        allocator.clear();
        Ok(allocator)
    }

    // == Alloc ==
    /// Reserves enough contiguous blocks for `size_bytes`.
    ///
    /// A zero-byte request still takes one block.
    pub fn alloc(&mut self, size_bytes: u32, expiry: i64, timestamp: i64) -> Result<Region> {
        let needed = size_bytes.div_ceil(self.block_size).max(1);

        let found = self
            .free_runs
            .iter()
            .find(|(_, len)| **len >= needed)
            .map(|(start, len)| (*start, *len));

        let Some((start, len)) = found else {
            return Err(CacheError::OutOfSpace {
                requested: size_bytes as usize,
                free: self.free_bytes() as usize,
            });
        };

        self.free_runs.remove(&start);
        if len > needed {
            self.free_runs.insert(start + needed, len - needed);
        }
        self.free_blocks -= needed;

        Ok(Region {
            size: size_bytes,
            used_blocks: needed,
            start_block: start,
            expiry,
            timestamp,
        })
    }

    // == Free ==
    /// Returns a region's blocks to the free list.
    ///
    /// Freeing blocks that are already free, or that lie outside the arena,
    /// means the index and the allocator disagree and is reported as corruption.
    pub fn free(&mut self, region: Region) -> Result<()> {
        let start = region.start_block;
        let len = region.used_blocks;
        self.check_bounds(start, len)?;

        let end = start + len;
        let overlaps_prev = self
            .free_runs
            .range(..=start)
            .next_back()
            .is_some_and(|(s, l)| s + l > start);
        let overlaps_next = self.free_runs.range(start..end).next().is_some();
        if overlaps_prev || overlaps_next {
            return Err(CacheError::Corruption(format!(
                "blocks {}..{} freed while not allocated",
                start, end
            )));
        }

        let mut run_start = start;
        let mut run_len = len;

        // Coalesce with the preceding run
        if let Some((&prev_start, &prev_len)) = self.free_runs.range(..start).next_back() {
            if prev_start + prev_len == start {
                self.free_runs.remove(&prev_start);
                run_start = prev_start;
                run_len += prev_len;
            }
        }

        // Coalesce with the following run
        if let Some(next_len) = self.free_runs.remove(&end) {
            run_len += next_len;
        }

        self.free_runs.insert(run_start, run_len);
        self.free_blocks += len;
        Ok(())
    }

    // == Get ==
    /// Returns the first `size` bytes of the run starting at `start_block`.
    pub fn get(&self, start_block: u32, size: u32) -> Result<&[u8]> {
        let range = self.byte_range(start_block, size)?;
        Ok(&self.arena[range])
    }

    /// Mutable view used while writing a freshly allocated region.
    pub fn get_mut(&mut self, start_block: u32, size: u32) -> Result<&mut [u8]> {
        let range = self.byte_range(start_block, size)?;
        Ok(&mut self.arena[range])
    }

    fn byte_range(&self, start_block: u32, size: u32) -> Result<std::ops::Range<usize>> {
        let blocks = size.div_ceil(self.block_size).max(1);
        self.check_bounds(start_block, blocks)?;
        let offset = start_block as usize * self.block_size as usize;
        Ok(offset..offset + size as usize)
    }

    fn check_bounds(&self, start_block: u32, blocks: u32) -> Result<()> {
        match start_block.checked_add(blocks) {
            Some(end) if blocks > 0 && end <= self.total_blocks => Ok(()),
            _ => Err(CacheError::Corruption(format!(
                "run of {} blocks at {} is outside an arena of {} blocks",
                blocks, start_block, self.total_blocks
            ))),
        }
    }

    // == Accounting ==
    /// Total bytes addressable by the arena.
    pub fn store_size_bytes(&self) -> u64 {
        u64::from(self.total_blocks) * u64::from(self.block_size)
    }

    /// Bytes in blocks that are not currently allocated.
    pub fn free_bytes(&self) -> u64 {
        u64::from(self.free_blocks) * u64::from(self.block_size)
    }

    // == Clear / Close ==
    /// Releases every allocation at once.
    pub fn clear(&mut self) {
        self.free_runs.clear();
        if self.total_blocks > 0 {
            self.free_runs.insert(0, self.total_blocks);
        }
        self.free_blocks = self.total_blocks;
    }

    /// Drops the arena. Subsequent allocations fail with `OutOfSpace`.
    pub fn close(&mut self) {
        self.arena = Box::default();
        self.total_blocks = 0;
        self.clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_rounds_up_to_blocks() {
        let mut blocks = BlockAllocator::new(1024, 16).unwrap();

        let region = blocks.alloc(17, 0, 0).unwrap();
        assert_eq!(region.used_blocks, 2);
        assert_eq!(region.size, 17);
        assert_eq!(blocks.free_bytes(), 1024 - 32);

        let empty = blocks.alloc(0, 0, 0).unwrap();
        assert_eq!(empty.used_blocks, 1);
    }

    #[test]
    fn test_alloc_out_of_space() {
        let mut blocks = BlockAllocator::new(64, 16).unwrap();

        let result = blocks.alloc(65, 0, 0);
        assert!(matches!(result, Err(CacheError::OutOfSpace { .. })));
        assert_eq!(blocks.free_bytes(), 64);
    }

    #[test]
    fn test_free_coalesces_runs() {
        let mut blocks = BlockAllocator::new(64, 16).unwrap();

        let a = blocks.alloc(16, 0, 0).unwrap();
        let b = blocks.alloc(16, 0, 0).unwrap();
        let c = blocks.alloc(16, 0, 0).unwrap();
        let _d = blocks.alloc(16, 0, 0).unwrap();
        assert!(blocks.alloc(1, 0, 0).is_err());

        blocks.free(a).unwrap();
        blocks.free(c).unwrap();
        // Two separate single-block holes cannot hold two blocks
        assert!(blocks.alloc(32, 0, 0).is_err());

        blocks.free(b).unwrap();
        let merged = blocks.alloc(48, 0, 0).unwrap();
        assert_eq!(merged.start_block, 0);
        assert_eq!(merged.used_blocks, 3);
    }

    #[test]
    fn test_double_free_is_corruption() {
        let mut blocks = BlockAllocator::new(64, 16).unwrap();

        let region = blocks.alloc(20, 0, 0).unwrap();
        let forged = Region {
            size: region.size,
            used_blocks: region.used_blocks,
            start_block: region.start_block,
            expiry: 0,
            timestamp: 0,
        };
        blocks.free(region).unwrap();

        assert!(matches!(blocks.free(forged), Err(CacheError::Corruption(_))));
        assert_eq!(blocks.free_bytes(), 64);
    }

    #[test]
    fn test_get_reads_written_bytes() {
        let mut blocks = BlockAllocator::new(128, 8).unwrap();
        let region = blocks.alloc(11, 0, 0).unwrap();

        blocks
            .get_mut(region.start_block, region.size)
            .unwrap()
            .copy_from_slice(b"hello world");

        assert_eq!(blocks.get(region.start_block, region.size).unwrap(), b"hello world");
        assert!(blocks.get(1000, 4).is_err());
    }

    #[test]
    fn test_clear_and_close() {
        let mut blocks = BlockAllocator::new(64, 16).unwrap();
        let _ = blocks.alloc(40, 0, 0).unwrap();

        blocks.clear();
        assert_eq!(blocks.free_bytes(), blocks.store_size_bytes());

        blocks.close();
        assert_eq!(blocks.store_size_bytes(), 0);
        assert!(blocks.alloc(1, 0, 0).is_err());
    }

    #[test]
    fn test_zero_block_size_rejected() {
        assert!(BlockAllocator::new(64, 0).is_err());
    }
}
