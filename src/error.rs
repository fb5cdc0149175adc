//! Error types for the cache server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache engine and its HTTP surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// No contiguous run of free blocks is large enough for the request
    #[error("Out of space: {requested} bytes requested, {free} bytes free")]
    OutOfSpace { requested: usize, free: usize },

    /// The configured item ceiling has been reached
    #[error("Item limit of {0} reached")]
    ItemLimit(usize),

    /// Storage invariant violated (double free, undecodable record)
    #[error("Storage corruption: {0}")]
    Corruption(String),

    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data or configuration
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Capacity errors are expected under load and become `NOT_STORED`.
    pub fn is_capacity(&self) -> bool {
        matches!(self, CacheError::OutOfSpace { .. } | CacheError::ItemLimit(_))
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::OutOfSpace { .. } | CacheError::ItemLimit(_) => {
                StatusCode::INSUFFICIENT_STORAGE
            }
            CacheError::Corruption(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache server.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_classification() {
        assert!(CacheError::OutOfSpace {
            requested: 10,
            free: 0
        }
        .is_capacity());
        assert!(CacheError::ItemLimit(3).is_capacity());
        assert!(!CacheError::Corruption("bad".to_string()).is_capacity());
    }

    #[test]
    fn test_status_codes() {
        let resp = CacheError::NotFound("k".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = CacheError::Corruption("double free".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let resp = CacheError::InvalidRequest("empty key".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
