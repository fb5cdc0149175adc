//! API Handlers
//!
//! HTTP request handlers for each cache server endpoint. Each handler
//! validates its input, runs one engine command and reports the memcached
//! result code.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::cache::{current_time_secs, Cache, CacheEntry, IncrDecrResponse, StoreResponse};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::models::{
    validate_key, CasRequest, CounterRequest, CounterResponse, DeleteQuery, DeleteResult,
    FlushResponse, GetResponse, HealthResponse, MultiGetQuery, MultiGetResponse, StatsResponse,
    StoreRequest, StoreResult,
};

/// Application state shared across all handlers.
///
/// The engine synchronises internally, so handlers share it through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<Cache>,
}

impl AppState {
    /// Creates a new AppState around the given engine.
    pub fn new(cache: Cache) -> Self {
        Self {
            cache: Arc::new(cache),
        }
    }

    /// Builds the engine described by the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(Cache::from_config(config)?))
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(msg) => Err(CacheError::InvalidRequest(msg)),
        None => Ok(()),
    }
}

fn store_entry(req: StoreRequest) -> Result<CacheEntry> {
    if let Some(msg) = req.validate() {
        return Err(CacheError::InvalidRequest(msg));
    }
    Ok(req.into_entry(current_time_secs()))
}

/// Runs one storage command and wraps its outcome.
fn run_store(
    req: StoreRequest,
    command: impl FnOnce(CacheEntry) -> Result<StoreResponse>,
) -> Result<Json<StoreResult>> {
    let entry = store_entry(req)?;
    let key = entry.key.clone();
    let status = command(entry)?;
    Ok(Json(StoreResult::new(key, status)))
}

/// Handler for PUT /set
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResult>> {
    run_store(req, |entry| state.cache.set(entry))
}

/// Handler for PUT /add
///
/// Stores only if the key holds no live item.
pub async fn add_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResult>> {
    run_store(req, |entry| state.cache.add(entry))
}

/// Handler for PUT /replace
pub async fn replace_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResult>> {
    run_store(req, |entry| state.cache.replace(entry))
}

/// Handler for PUT /append
pub async fn append_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResult>> {
    run_store(req, |entry| state.cache.append(entry))
}

/// Handler for PUT /prepend
pub async fn prepend_handler(
    State(state): State<AppState>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResult>> {
    run_store(req, |entry| state.cache.prepend(entry))
}

/// Handler for PUT /cas
///
/// Stores only if the item still carries the token the client read.
pub async fn cas_handler(
    State(state): State<AppState>,
    Json(req): Json<CasRequest>,
) -> Result<Json<StoreResult>> {
    let token = req.cas;
    run_store(req.item, |entry| state.cache.cas(token, entry))
}

/// Maps a counter outcome onto a response or an error.
fn counter_result(key: String, outcome: IncrDecrResponse) -> Result<Json<CounterResponse>> {
    match outcome {
        IncrDecrResponse::Value(value) => Ok(Json(CounterResponse { key, value })),
        IncrDecrResponse::NotFound => Err(CacheError::NotFound(key)),
        IncrDecrResponse::NonNumeric => Err(CacheError::InvalidRequest(
            "cannot increment or decrement non-numeric value".to_string(),
        )),
    }
}

fn counter_delta(req: &CounterRequest) -> Result<i64> {
    if let Some(msg) = req.validate() {
        return Err(CacheError::InvalidRequest(msg));
    }
    i64::try_from(req.delta).map_err(|e| CacheError::InvalidRequest(e.to_string()))
}

/// Handler for POST /incr
pub async fn incr_handler(
    State(state): State<AppState>,
    Json(req): Json<CounterRequest>,
) -> Result<Json<CounterResponse>> {
    let delta = counter_delta(&req)?;
    let outcome = state.cache.incr(&req.key, delta)?;
    counter_result(req.key, outcome)
}

/// Handler for POST /decr
///
/// Counters floor at zero.
pub async fn decr_handler(
    State(state): State<AppState>,
    Json(req): Json<CounterRequest>,
) -> Result<Json<CounterResponse>> {
    let delta = counter_delta(&req)?;
    let outcome = state.cache.decr(&req.key, delta)?;
    counter_result(req.key, outcome)
}

/// Handler for GET /get/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;
    match state.cache.get_one(&key)? {
        Some(entry) => Ok(Json(GetResponse::from(entry))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for GET /get?keys=a,b,c
///
/// Returns the items found, in request order.
pub async fn multi_get_handler(
    State(state): State<AppState>,
    Query(query): Query<MultiGetQuery>,
) -> Result<Json<MultiGetResponse>> {
    let keys = query.key_list();
    if keys.is_empty() {
        return Err(CacheError::InvalidRequest("No keys given".to_string()));
    }
    for key in &keys {
        check_key(key)?;
    }

    let entries = state.cache.get(keys.as_slice())?;
    Ok(Json(MultiGetResponse::from(entries)))
}

/// Handler for DELETE /delete/:key
///
/// With `?delay=N` the key reads as missing at once and is removed by the
/// scavenger after N seconds.
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResult>> {
    check_key(&key)?;
    let status = state.cache.delete(&key, query.delay)?;
    Ok(Json(DeleteResult::new(key, status)))
}

/// Handler for POST /flush_all
pub async fn flush_handler(State(state): State<AppState>) -> Json<FlushResponse> {
    state.cache.flush_all();
    Json(FlushResponse {
        message: "OK".to_string(),
    })
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        stats: state.cache.stats(),
        pending_deletes: state.cache.pending_deletes(),
    })
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
