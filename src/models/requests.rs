//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.

use serde::Deserialize;

use crate::cache::{CacheEntry, MAX_KEY_LENGTH, MAX_VALUE_SIZE};

/// Checks a key against the memcached key rules.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Some("Key cannot contain whitespace or control characters".to_string());
    }
    None
}

/// Request body for the storage commands (PUT /set, /add, /replace,
/// /append, /prepend)
///
/// # Fields
/// - `key`: The cache key
/// - `value`: The payload
/// - `flags`: Opaque client flags stored with the value
/// - `exptime`: memcached expiration time (0 = never, up to 30 days relative,
///   otherwise an absolute epoch second)
#[derive(Debug, Clone, Deserialize)]
pub struct StoreRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub exptime: i64,
}

impl StoreRequest {
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key).or_else(|| validate_value(&self.value))
    }

    /// Builds the entry to store, resolving `exptime` against `now`.
    pub fn into_entry(self, now: i64) -> CacheEntry {
        let expire = crate::cache::expiry_from_exptime(self.exptime, now);
        CacheEntry::new(self.key, self.flags, expire, self.value.into_bytes())
    }
}

fn validate_value(value: &str) -> Option<String> {
    if value.len() > MAX_VALUE_SIZE {
        return Some(format!(
            "Value exceeds maximum size of {} bytes",
            MAX_VALUE_SIZE
        ));
    }
    None
}

/// Request body for PUT /cas: a storage request plus the token from a
/// previous get.
#[derive(Debug, Clone, Deserialize)]
pub struct CasRequest {
    #[serde(flatten)]
    pub item: StoreRequest,
    pub cas: u64,
}

/// Request body for POST /incr and POST /decr
#[derive(Debug, Clone, Deserialize)]
pub struct CounterRequest {
    pub key: String,
    /// Amount to add or subtract (default: 1)
    #[serde(default = "default_delta")]
    pub delta: u64,
}

fn default_delta() -> u64 {
    1
}

impl CounterRequest {
    pub fn validate(&self) -> Option<String> {
        if let Some(msg) = validate_key(&self.key) {
            return Some(msg);
        }
        if i64::try_from(self.delta).is_err() {
            return Some(format!("Delta exceeds maximum of {}", i64::MAX));
        }
        None
    }
}

/// Query string for DELETE /delete/:key
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteQuery {
    /// Seconds to keep the key blocked before removal, 0 = immediately
    #[serde(default)]
    pub delay: i64,
}

/// Query string for GET /get?keys=a,b,c
#[derive(Debug, Clone, Deserialize)]
pub struct MultiGetQuery {
    pub keys: String,
}

impl MultiGetQuery {
    /// Comma-separated keys with empty segments dropped.
    pub fn key_list(&self) -> Vec<String> {
        self.keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(String::from)
            .collect()
    }
}
