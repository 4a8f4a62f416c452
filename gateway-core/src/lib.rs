//! The reference-resolution engine for the API aggregation gateway.
//!
//! This crate holds the parts of the system that are pure JSON
//! transformation plus I/O contracts: the `$rel` dialect, the placeholder
//! resolver, the cache-key builder, the per-request memo, and the
//! traversal/resolution engine that ties them together. It has no
//! opinion on how bytes reach a backend or a shared cache — those are
//! the [`Fetcher`] and [`SharedCache`] traits, which the `gateway` binary
//! crate implements against `hyper` and Redis.

pub mod cache_key;
pub mod error;
pub mod fetcher;
pub mod memo;
pub mod placeholder;
pub mod reference;
pub mod resolve;
pub mod shared_cache;

pub use error::ResolveError;
pub use fetcher::{FetchBody, FetchRequest, FetchResponse, Fetcher};
pub use memo::RequestMemo;
pub use resolve::{walk, ResolveContext};
pub use shared_cache::{NoopSharedCache, SharedCache};
