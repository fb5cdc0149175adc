//! Response DTOs for the cache server API
//!
//! Defines the structure of outgoing HTTP response bodies. Command outcomes
//! carry memcached result names (`STORED`, `NOT_STORED`, `EXISTS`,
//! `NOT_FOUND`, `DELETED`).

use serde::Serialize;

use crate::cache::{CacheEntry, DeleteResponse, StatsSnapshot, StoreResponse};

/// Outcome of a storage command
#[derive(Debug, Clone, Serialize)]
pub struct StoreResult {
    pub key: String,
    pub status: StoreResponse,
}

impl StoreResult {
    pub fn new(key: impl Into<String>, status: StoreResponse) -> Self {
        Self {
            key: key.into(),
            status,
        }
    }
}

/// Outcome of DELETE /delete/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub key: String,
    pub status: DeleteResponse,
}

impl DeleteResult {
    pub fn new(key: impl Into<String>, status: DeleteResponse) -> Self {
        Self {
            key: key.into(),
            status,
        }
    }
}

/// One retrieved item (GET /get/:key)
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    /// Payload, with invalid UTF-8 replaced
    pub value: String,
    pub flags: u32,
    /// Token for a later PUT /cas
    pub cas: u64,
}

impl From<CacheEntry> for GetResponse {
    fn from(entry: CacheEntry) -> Self {
        Self {
            value: String::from_utf8_lossy(&entry.data).into_owned(),
            key: entry.key,
            flags: entry.flags,
            cas: entry.cas_token,
        }
    }
}

/// Items found by GET /get?keys=..., in request order. Misses are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct MultiGetResponse {
    pub items: Vec<GetResponse>,
}

impl From<Vec<CacheEntry>> for MultiGetResponse {
    fn from(entries: Vec<CacheEntry>) -> Self {
        Self {
            items: entries.into_iter().map(GetResponse::from).collect(),
        }
    }
}

/// New counter value after POST /incr or POST /decr
#[derive(Debug, Clone, Serialize)]
pub struct CounterResponse {
    pub key: String,
    pub value: u64,
}

/// Response body for POST /flush_all
#[derive(Debug, Clone, Serialize)]
pub struct FlushResponse {
    pub message: String,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    /// Delayed deletes not yet finalised
    pub pending_deletes: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;

    #[test]
    fn test_store_result_uses_memcached_names() {
        let json = serde_json::to_string(&StoreResult::new("k", StoreResponse::NotStored)).unwrap();
        assert_eq!(json, r#"{"key":"k","status":"NOT_STORED"}"#);

        let json = serde_json::to_string(&DeleteResult::new("k", DeleteResponse::Deleted)).unwrap();
        assert!(json.contains(r#""status":"DELETED""#));
    }

    #[test]
    fn test_get_response_from_entry() {
        let mut entry = CacheEntry::new("k", 3, 0, &b"hello"[..]);
        entry.cas_token = 12;
        let resp = GetResponse::from(entry);
        assert_eq!(resp.value, "hello");
        assert_eq!(resp.flags, 3);
        assert_eq!(resp.cas, 12);
    }

    #[test]
    fn test_get_response_lossy_value() {
        let resp = GetResponse::from(CacheEntry::new("k", 0, 0, vec![0xff, b'a']));
        assert_eq!(resp.value, "\u{fffd}a");
    }

    #[test]
    fn test_stats_response_flattens_snapshot() {
        let resp = StatsResponse {
            stats: CacheStats::new().snapshot(2, 1024, 64),
            pending_deletes: 1,
        };
        let json: serde_json::Value = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["curr_items"], 2);
        assert_eq!(json["pending_deletes"], 1);
        assert!(json.get("stats").is_none());
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"error":"Something went wrong"}"#);
    }
}
