//! API Module
//!
//! HTTP handlers and routing exposing the cache commands as a JSON API.
//! See [`create_router`] for the endpoint list.

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
