//! Key hashing for partition and bucket selection.
//!
//! The store picks a partition and the partition picks a bucket from the
//! same raw key hash, each through its own seeded avalanche mix, so the two
//! indices are independent of each other.

use std::sync::OnceLock;

use ahash::RandomState;

/// Seed for the store → partition stage.
pub const PARTITION_SEED: u64 = 0x9e37_79b9_7f4a_7c15;
/// Seed for the partition → bucket stage.
pub const BUCKET_SEED: u64 = 0xc2b2_ae3d_27d4_eb4f;

/// Fixed seeds so every partition and bucket agree on a key's hash.
fn hash_builder() -> &'static RandomState {
    static BUILDER: OnceLock<RandomState> = OnceLock::new();
    BUILDER.get_or_init(|| {
        RandomState::with_seeds(
            0xbb8c484891ec6c86,
            0x0522a25ae9c769f9,
            0xeed2797b9571bc75,
            0x4feb29c1fbbd59d0,
        )
    })
}

/// Raw hash of the key bytes.
pub fn key_hash(key: &str) -> u64 {
    hash_builder().hash_one(key)
}

/// 64-bit finaliser (murmur3 fmix64) applied to a seeded hash.
pub fn spread(hash: u64, seed: u64) -> u64 {
    let mut h = hash ^ seed;
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}

/// Index into a power-of-two table of `len` slots.
#[inline]
pub fn index_for(key: &str, seed: u64, len: usize) -> usize {
    debug_assert!(len.is_power_of_two());
    (spread(key_hash(key), seed) & (len as u64 - 1)) as usize
}
