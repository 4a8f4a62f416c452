//! The API aggregation gateway binary crate: service registry and config
//! loading, the `hyper`-based upstream fetcher, the Redis-backed shared
//! cache, and the `axum` HTTP ingress built around `gateway-core`'s
//! reference-resolution engine.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod openapi;
pub mod registry;
pub mod routes;
pub mod shared_cache;
pub mod state;
pub mod telemetry;

pub use routes::build_router;
pub use state::AppState;
