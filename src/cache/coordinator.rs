//! Cache Coordinator Module
//!
//! Memcached command semantics on top of the partitioned store: CAS token
//! issuance, conditional stores, counters, delayed deletion and statistics.
//!
//! The coordinator holds no lock of its own. Read-modify-write commands read
//! the current entry, build its successor and install it with
//! `replace_if_equal`; if another writer got there first the command starts
//! over from a fresh read.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::cache::entry::{current_time_secs, CacheEntry};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::cache::store::PartitionedStore;
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Result Codes ==
/// Outcome of a storage command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreResponse {
    Stored,
    NotStored,
    Exists,
    NotFound,
}

/// Outcome of a delete command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteResponse {
    Deleted,
    NotFound,
}

/// Outcome of an increment or decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrDecrResponse {
    /// The value after the update
    Value(u64),
    NotFound,
    /// The stored payload is not a non-negative decimal integer
    NonNumeric,
}

// == Delayed Deletes ==
/// A placeholder waiting for its real removal.
#[derive(Debug)]
pub struct DelayedDelete {
    pub fire_at: i64,
    seq: u64,
    pub placeholder: CacheEntry,
}

impl PartialEq for DelayedDelete {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for DelayedDelete {}

impl PartialOrd for DelayedDelete {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedDelete {
    // Reversed so the max-heap yields the earliest fire time first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Time-ordered queue of pending deletions.
#[derive(Debug, Default)]
struct DeleteQueue {
    heap: Mutex<BinaryHeap<DelayedDelete>>,
    seq: AtomicU64,
}

impl DeleteQueue {
    fn push(&self, placeholder: CacheEntry) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap.lock().push(DelayedDelete {
            fire_at: placeholder.blocked_until,
            seq,
            placeholder,
        });
    }

    /// Removes and returns every entry whose fire time is at or before `now`.
    fn pop_due(&self, now: i64) -> Vec<DelayedDelete> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while heap.peek().is_some_and(|next| next.fire_at <= now) {
            if let Some(next) = heap.pop() {
                due.push(next);
            }
        }
        due
    }

    fn len(&self) -> usize {
        self.heap.lock().len()
    }

    fn clear(&self) {
        self.heap.lock().clear();
    }
}

// == Cache ==
/// The cache engine consumed by protocol front-ends.
#[derive(Debug)]
pub struct Cache {
    store: PartitionedStore,
    delete_queue: DeleteQueue,
    cas_counter: AtomicU64,
    stats: CacheStats,
}

impl Cache {
    // == Constructor ==
    /// Wraps a store with fresh counters. The first CAS token issued is 1.
    pub fn new(store: PartitionedStore) -> Self {
        Self {
            store,
            delete_queue: DeleteQueue::default(),
            cas_counter: AtomicU64::new(1),
            stats: CacheStats::new(),
        }
    }

    /// Builds the store described by `config` and wraps it.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(PartitionedStore::from_config(config)?))
    }

    fn next_cas(&self) -> u64 {
        self.cas_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Maps storage errors onto result codes. Capacity failures become
    /// `NOT_STORED`; anything else means the store is damaged and propagates.
    fn storage_failure(&self, key: &str, err: CacheError) -> Result<StoreResponse> {
        if err.is_capacity() {
            warn!(key, error = %err, "store failed");
            Ok(StoreResponse::NotStored)
        } else {
            error!(key, error = %err, "storage failure");
            Err(err)
        }
    }

    fn report<T>(&self, key: &str, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            error!(key, error = %err, "storage failure");
        }
        result
    }

    /// Current entry for `key` if a client may see it.
    fn live(&self, key: &str, now: i64) -> Result<Option<CacheEntry>> {
        let current = self.report(key, self.store.get(key))?;
        Ok(current.filter(|entry| entry.is_live_at(now)))
    }

    /// Drops an expired entry unless it changed in the meantime.
    fn reap_expired(&self, entry: &CacheEntry) -> Result<()> {
        if !entry.blocked {
            self.report(&entry.key, self.store.remove_if_equal(&entry.key, entry))?;
        }
        Ok(())
    }

    // == Get ==
    /// Fetches every key, returning the live entries in request order.
    pub fn get<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<CacheEntry>> {
        self.stats.record_get();
        let now = current_time_secs();

        let fetched = if keys.len() == 1 {
            let key = keys[0].as_ref();
            self.report(key, self.store.get(key))?.into_iter().collect()
        } else {
            self.report("<multi>", self.store.get_multi(keys))?
        };

        let mut visible = HashMap::with_capacity(fetched.len());
        for entry in fetched {
            if entry.is_live_at(now) {
                visible.insert(entry.key.clone(), entry);
            } else if entry.is_expired_at(now) {
                self.reap_expired(&entry)?;
            }
        }

        let found: Vec<CacheEntry> = keys
            .iter()
            .filter_map(|key| visible.get(key.as_ref()).cloned())
            .collect();

        let hits = found.len() as u64;
        self.stats.record_hits(hits);
        self.stats.record_misses(keys.len() as u64 - hits);
        Ok(found)
    }

    /// Single-key convenience over `get`.
    pub fn get_one(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.get(std::slice::from_ref(&key))?.into_iter().next())
    }

    // == Set ==
    /// Stores unconditionally.
    pub fn set(&self, mut entry: CacheEntry) -> Result<StoreResponse> {
        self.stats.record_set();
        entry.cas_token = self.next_cas();

        let key = entry.key.clone();
        match self.store.put(&key, &entry) {
            Ok(_) => Ok(StoreResponse::Stored),
            Err(err) => self.storage_failure(&key, err),
        }
    }

    // == Add ==
    /// Stores only if no live entry exists for the key.
    pub fn add(&self, mut entry: CacheEntry) -> Result<StoreResponse> {
        self.stats.record_set();
        let key = entry.key.clone();
        let now = current_time_secs();

        loop {
            entry.cas_token = self.next_cas();
            let current = match self.store.put_if_absent(&key, &entry) {
                Ok(None) => return Ok(StoreResponse::Stored),
                Ok(Some(current)) => current,
                Err(err) => return self.storage_failure(&key, err),
            };

            if current.is_live_at(now) {
                return Ok(StoreResponse::NotStored);
            }

            // A placeholder or expired entry counts as absent
            match self.store.replace_if_equal(&key, &current, &entry) {
                Ok(true) => return Ok(StoreResponse::Stored),
                Ok(false) => continue,
                Err(err) => return self.storage_failure(&key, err),
            }
        }
    }

    // == Replace ==
    /// Stores only if a live entry exists for the key.
    pub fn replace(&self, entry: CacheEntry) -> Result<StoreResponse> {
        self.stats.record_set();
        let key = entry.key.clone();
        self.update(&key, |_| Some(entry.clone()))
    }

    // == Append / Prepend ==
    /// Appends the payload of `entry` to the stored payload.
    pub fn append(&self, entry: CacheEntry) -> Result<StoreResponse> {
        self.stats.record_set();
        self.update(&entry.key, |current| Some(current.appended(&entry.data)))
    }

    /// Prepends the payload of `entry` to the stored payload.
    pub fn prepend(&self, entry: CacheEntry) -> Result<StoreResponse> {
        self.stats.record_set();
        self.update(&entry.key, |current| Some(current.prepended(&entry.data)))
    }

    // == CAS ==
    /// Replaces the entry only if its CAS token still equals `cas_token`.
    pub fn cas(&self, cas_token: u64, entry: CacheEntry) -> Result<StoreResponse> {
        self.stats.record_set();
        let key = entry.key.clone();
        self.update(&key, |current| {
            (current.cas_token == cas_token).then(|| entry.clone())
        })
    }

    /// Optimistic read-modify-write over a live entry.
    ///
    /// `next` builds the successor from the current entry, or returns None
    /// to report `EXISTS`. A fresh CAS token is stamped on every attempt.
    fn update<F>(&self, key: &str, mut next: F) -> Result<StoreResponse>
    where
        F: FnMut(&CacheEntry) -> Option<CacheEntry>,
    {
        let now = current_time_secs();
        loop {
            let Some(current) = self.live(key, now)? else {
                return Ok(StoreResponse::NotFound);
            };
            let Some(mut successor) = next(&current) else {
                return Ok(StoreResponse::Exists);
            };
            successor.cas_token = self.next_cas();

            match self.store.replace_if_equal(key, &current, &successor) {
                Ok(true) => return Ok(StoreResponse::Stored),
                Ok(false) => debug!(key, "entry changed during update, retrying"),
                Err(err) => return self.storage_failure(key, err),
            }
        }
    }

    // == Incr / Decr ==
    /// Adds `delta` to a decimal payload. Negative deltas stop at zero.
    pub fn incr(&self, key: &str, delta: i64) -> Result<IncrDecrResponse> {
        let now = current_time_secs();
        loop {
            let Some(current) = self.live(key, now)? else {
                return Ok(IncrDecrResponse::NotFound);
            };
            let Some((value, mut successor)) = current.with_delta(delta) else {
                return Ok(IncrDecrResponse::NonNumeric);
            };
            successor.cas_token = self.next_cas();

            match self.store.replace_if_equal(key, &current, &successor) {
                Ok(true) => return Ok(IncrDecrResponse::Value(value)),
                Ok(false) => debug!(key, "counter changed during update, retrying"),
                // A longer decimal may not fit; the old value stays in place
                Err(err) if err.is_capacity() => {
                    warn!(key, error = %err, "counter update failed");
                    return Err(err);
                }
                Err(err) => return self.report(key, Err(err)),
            }
        }
    }

    /// Subtracts `delta`, stopping at zero.
    pub fn decr(&self, key: &str, delta: i64) -> Result<IncrDecrResponse> {
        self.incr(key, delta.saturating_neg())
    }

    // == Delete ==
    /// Removes `key` now, or after `delay` seconds when `delay > 0`.
    ///
    /// A delayed delete swaps in a blocked placeholder, which reads as a miss
    /// at once, and queues the placeholder for the scavenger.
    pub fn delete(&self, key: &str, delay: i64) -> Result<DeleteResponse> {
        let now = current_time_secs();

        if delay <= 0 {
            let removed = self.report(key, self.store.remove(key))?;
            return Ok(match removed {
                Some(entry) if entry.is_live_at(now) => DeleteResponse::Deleted,
                _ => DeleteResponse::NotFound,
            });
        }

        loop {
            let Some(current) = self.report(key, self.store.get(key))? else {
                return Ok(DeleteResponse::NotFound);
            };
            let was_live = current.is_live_at(now);

            let mut placeholder = CacheEntry::placeholder(key, now.saturating_add(delay));
            placeholder.cas_token = self.next_cas();

            // A placeholder is never larger than the entry it replaces
            if self.report(key, self.store.replace_if_equal(key, &current, &placeholder))? {
                debug!(key, fire_at = placeholder.blocked_until, "delete scheduled");
                self.delete_queue.push(placeholder);
                return Ok(if was_live {
                    DeleteResponse::Deleted
                } else {
                    DeleteResponse::NotFound
                });
            }
        }
    }

    // == Flush ==
    /// Drops every entry and every pending delayed delete.
    pub fn flush_all(&self) {
        self.store.clear();
        self.delete_queue.clear();
        info!("cache flushed");
    }

    // == Scavenger ==
    /// Finalises every delayed delete due at `now`.
    ///
    /// A key is removed only while it still holds the placeholder that was
    /// queued, so a value stored after the delete survives. Returns the
    /// number of keys removed.
    pub fn process_delayed_deletes_at(&self, now: i64) -> Result<usize> {
        let mut removed = 0;
        for due in self.delete_queue.pop_due(now) {
            let key = &due.placeholder.key;
            if self.report(key, self.store.remove_if_equal(key, &due.placeholder))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn process_delayed_deletes(&self) -> Result<usize> {
        self.process_delayed_deletes_at(current_time_secs())
    }

    /// Number of delayed deletes not yet fired.
    pub fn pending_deletes(&self) -> usize {
        self.delete_queue.len()
    }

    // == Introspection ==
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot(
            self.store.len(),
            self.store.memory_capacity(),
            self.store.memory_used(),
        )
    }

    pub fn keys(&self) -> Result<HashSet<String>> {
        self.store.key_set()
    }

    /// Items physically stored, placeholders included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn memory_used(&self) -> u64 {
        self.store.memory_used()
    }

    pub fn memory_capacity(&self) -> u64 {
        self.store.memory_capacity()
    }

    // == Close ==
    /// Drops pending deletes and releases the store. Contents are lost.
    pub fn close(&self) {
        self.delete_queue.clear();
        self.store.close();
        info!("cache closed");
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cache() -> Cache {
        Cache::new(PartitionedStore::new(4, 256 * 1024, 16, 64, 0).unwrap())
    }

    fn item(key: &str, value: &str) -> CacheEntry {
        CacheEntry::new(key, 0, 0, value.as_bytes().to_vec())
    }

    fn payload(cache: &Cache, key: &str) -> Option<Vec<u8>> {
        cache.get_one(key).unwrap().map(|e| e.data.to_vec())
    }

    #[test]
    fn test_basic_lifecycle() {
        let cache = cache();

        assert_eq!(cache.add(item("x", "hello")).unwrap(), StoreResponse::Stored);
        assert_eq!(payload(&cache, "x"), Some(b"hello".to_vec()));

        assert_eq!(cache.set(item("x", "world")).unwrap(), StoreResponse::Stored);
        assert_eq!(payload(&cache, "x"), Some(b"world".to_vec()));

        assert_eq!(cache.delete("x", 0).unwrap(), DeleteResponse::Deleted);
        assert_eq!(payload(&cache, "x"), None);
        assert_eq!(cache.delete("x", 0).unwrap(), DeleteResponse::NotFound);
    }

    #[test]
    fn test_add_existing_is_not_stored() {
        let cache = cache();
        cache.set(item("k", "a")).unwrap();

        assert_eq!(cache.add(item("k", "b")).unwrap(), StoreResponse::NotStored);
        assert_eq!(payload(&cache, "k"), Some(b"a".to_vec()));
    }

    #[test]
    fn test_replace_requires_existing() {
        let cache = cache();

        assert_eq!(cache.replace(item("k", "a")).unwrap(), StoreResponse::NotFound);
        cache.set(item("k", "a")).unwrap();
        assert_eq!(cache.replace(item("k", "b")).unwrap(), StoreResponse::Stored);
        assert_eq!(payload(&cache, "k"), Some(b"b".to_vec()));
    }

    #[test]
    fn test_append_and_prepend() {
        let cache = cache();

        assert_eq!(cache.append(item("x", "cd")).unwrap(), StoreResponse::NotFound);

        cache.set(item("x", "ab")).unwrap();
        assert_eq!(cache.append(item("x", "cd")).unwrap(), StoreResponse::Stored);
        assert_eq!(payload(&cache, "x"), Some(b"abcd".to_vec()));

        assert_eq!(cache.prepend(item("x", "__")).unwrap(), StoreResponse::Stored);
        assert_eq!(payload(&cache, "x"), Some(b"__abcd".to_vec()));
    }

    #[test]
    fn test_append_keeps_flags_and_bumps_cas() {
        let cache = cache();
        cache.set(CacheEntry::new("x", 42, 0, &b"ab"[..])).unwrap();
        let before = cache.get_one("x").unwrap().unwrap();

        cache.append(CacheEntry::new("x", 7, 0, &b"cd"[..])).unwrap();
        let after = cache.get_one("x").unwrap().unwrap();

        assert_eq!(after.flags, 42);
        assert!(after.cas_token > before.cas_token);
    }

    #[test]
    fn test_cas_token_single_use() {
        let cache = cache();
        cache.set(item("k", "v")).unwrap();
        let token = cache.get_one("k").unwrap().unwrap().cas_token;

        assert_eq!(cache.cas(token, item("k", "v2")).unwrap(), StoreResponse::Stored);
        assert_eq!(cache.cas(token, item("k", "v3")).unwrap(), StoreResponse::Exists);
        assert_eq!(payload(&cache, "k"), Some(b"v2".to_vec()));
        assert_eq!(cache.cas(token, item("missing", "v")).unwrap(), StoreResponse::NotFound);
    }

    #[test]
    fn test_cas_tokens_start_at_one_and_increase() {
        let cache = cache();
        cache.set(item("a", "1")).unwrap();
        cache.set(item("b", "2")).unwrap();

        let a = cache.get_one("a").unwrap().unwrap().cas_token;
        let b = cache.get_one("b").unwrap().unwrap().cas_token;
        assert_eq!(a, 1);
        assert!(b > a);
    }

    #[test]
    fn test_incr_decr() {
        let cache = cache();
        cache.set(item("n", "3")).unwrap();

        assert_eq!(cache.incr("n", 4).unwrap(), IncrDecrResponse::Value(7));
        assert_eq!(cache.decr("n", 2).unwrap(), IncrDecrResponse::Value(5));
        assert_eq!(cache.incr("n", -10).unwrap(), IncrDecrResponse::Value(0));
        assert_eq!(payload(&cache, "n"), Some(b"0".to_vec()));
        assert_eq!(cache.incr("missing", 1).unwrap(), IncrDecrResponse::NotFound);

        cache.set(item("s", "abc")).unwrap();
        assert_eq!(cache.incr("s", 1).unwrap(), IncrDecrResponse::NonNumeric);
    }

    #[test]
    fn test_delayed_delete_hides_then_sweeps() {
        let cache = cache();
        cache.set(item("k", "v")).unwrap();

        assert_eq!(cache.delete("k", 5).unwrap(), DeleteResponse::Deleted);
        assert_eq!(payload(&cache, "k"), None);
        assert_eq!(cache.replace(item("k", "x")).unwrap(), StoreResponse::NotFound);
        // The placeholder still occupies the store until the scavenger runs
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.pending_deletes(), 1);

        let now = current_time_secs();
        assert_eq!(cache.process_delayed_deletes_at(now).unwrap(), 0);
        assert_eq!(cache.process_delayed_deletes_at(now + 10).unwrap(), 1);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.memory_used(), 0);
    }

    #[test]
    fn test_value_stored_after_delayed_delete_survives_sweep() {
        let cache = cache();
        cache.set(item("k", "old")).unwrap();
        cache.delete("k", 5).unwrap();

        assert_eq!(cache.add(item("k", "new")).unwrap(), StoreResponse::Stored);
        cache
            .process_delayed_deletes_at(current_time_secs() + 10)
            .unwrap();

        assert_eq!(payload(&cache, "k"), Some(b"new".to_vec()));
    }

    #[test]
    fn test_second_delayed_delete_is_harmless() {
        let cache = cache();
        cache.set(item("k", "v")).unwrap();

        assert_eq!(cache.delete("k", 5).unwrap(), DeleteResponse::Deleted);
        assert_eq!(cache.delete("k", 5).unwrap(), DeleteResponse::NotFound);
        assert_eq!(cache.pending_deletes(), 2);

        let removed = cache
            .process_delayed_deletes_at(current_time_secs() + 10)
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = cache();
        let past = current_time_secs() - 10;
        cache.set(CacheEntry::new("old", 0, past, &b"v"[..])).unwrap();

        assert_eq!(payload(&cache, "old"), None);
        // The expired entry is reaped on access
        assert!(cache.is_empty());
        assert_eq!(cache.add(item("old", "fresh")).unwrap(), StoreResponse::Stored);
    }

    #[test]
    fn test_get_multi_counts_hits_and_misses() {
        let cache = cache();
        cache.set(item("a", "1")).unwrap();
        cache.set(item("b", "2")).unwrap();

        let found = cache.get(&["b", "nope", "a"][..]).unwrap();
        let keys: Vec<&str> = found.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);

        let stats = cache.stats();
        assert_eq!(stats.get_cmds, 1);
        assert_eq!(stats.get_hits, 2);
        assert_eq!(stats.get_misses, 1);
        assert_eq!(stats.set_cmds, 2);
        assert_eq!(stats.curr_items, 2);
    }

    #[test]
    fn test_flush_all() {
        let cache = cache();
        cache.set(item("a", "1")).unwrap();
        cache.delete("a", 30).unwrap();
        cache.set(item("b", "2")).unwrap();

        cache.flush_all();
        assert!(cache.is_empty());
        assert_eq!(cache.pending_deletes(), 0);
        assert_eq!(cache.memory_used(), 0);
    }

    #[test]
    fn test_out_of_space_is_not_stored() {
        // A single 64-byte block
        let cache = Cache::new(PartitionedStore::new(1, 64, 64, 4, 0).unwrap());
        assert_eq!(cache.set(item("a", "tiny")).unwrap(), StoreResponse::Stored);

        let big = CacheEntry::new("b", 0, 0, vec![0u8; 128]);
        assert_eq!(cache.set(big).unwrap(), StoreResponse::NotStored);
        assert_eq!(payload(&cache, "a"), Some(b"tiny".to_vec()));
    }

    #[test]
    fn test_concurrent_add_single_winner() {
        let cache = Arc::new(cache());

        let handles: Vec<_> = ["v1", "v2"]
            .into_iter()
            .map(|value| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.add(item("race", value)).unwrap())
            })
            .collect();

        let mut results: Vec<StoreResponse> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        results.sort_by_key(|r| *r as u8);
        assert_eq!(results, vec![StoreResponse::Stored, StoreResponse::NotStored]);
    }

    #[test]
    fn test_concurrent_incr_loses_no_updates() {
        let cache = Arc::new(cache());
        cache.set(item("counter", "0")).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..50 {
                        cache.incr("counter", 1).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(payload(&cache, "counter"), Some(b"200".to_vec()));
    }

    #[test]
    fn test_item_limit_is_not_stored() {
        let cache = Cache::new(PartitionedStore::new(2, 64 * 1024, 16, 16, 2).unwrap());

        assert_eq!(cache.set(item("a", "1")).unwrap(), StoreResponse::Stored);
        assert_eq!(cache.add(item("b", "2")).unwrap(), StoreResponse::Stored);
        assert_eq!(cache.set(item("c", "3")).unwrap(), StoreResponse::NotStored);
        assert_eq!(cache.add(item("c", "3")).unwrap(), StoreResponse::NotStored);
        assert_eq!(payload(&cache, "c"), None);

        // Overwriting an existing key does not need a new slot
        assert_eq!(cache.set(item("a", "11")).unwrap(), StoreResponse::Stored);
        assert_eq!(payload(&cache, "a"), Some(b"11".to_vec()));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_delayed_delete_with_huge_delay_stays_blocked() {
        let cache = cache();
        cache.set(item("k", "v")).unwrap();

        assert_eq!(cache.delete("k", i64::MAX).unwrap(), DeleteResponse::Deleted);
        assert_eq!(payload(&cache, "k"), None);

        let now = current_time_secs();
        assert_eq!(cache.process_delayed_deletes_at(now + 3600).unwrap(), 0);
        assert_eq!(cache.pending_deletes(), 1);
        assert_eq!(cache.len(), 1, "placeholder must survive until its deadline");
    }

    #[test]
    fn test_negative_delete_delay_removes_now() {
        let cache = cache();
        cache.set(item("k", "v")).unwrap();

        assert_eq!(cache.delete("k", -5).unwrap(), DeleteResponse::Deleted);
        assert_eq!(cache.pending_deletes(), 0);
        assert!(cache.is_empty());

        cache.set(item("k", "v")).unwrap();
        assert_eq!(cache.delete("k", i64::MIN).unwrap(), DeleteResponse::Deleted);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_incr_out_of_space_is_storage_error() {
        // One block that holds "9" under key "n" exactly
        let block = item("n", "9").encoded_len() as u32;
        let cache = Cache::new(PartitionedStore::new(1, u64::from(block), block, 8, 0).unwrap());
        cache.set(item("n", "9")).unwrap();

        let result = cache.incr("n", 1);
        assert!(matches!(result, Err(CacheError::OutOfSpace { .. })));
        assert_eq!(payload(&cache, "n"), Some(b"9".to_vec()));
    }
}
