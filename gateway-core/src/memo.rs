//! Per-request memo.
//!
//! One [`RequestMemo`] lives for the duration of a single inbound request
//! and is threaded through the whole traversal by reference. It gives two
//! references to the same cache key — anywhere in the tree — the same
//! in-flight [`Shared`] future, which is both the deduplication guarantee
//! (at most one upstream fetch per cache key per request) and the
//! diamond/cycle breaker.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::{BoxFuture, Shared};
use serde_json::Value;

use crate::error::ResolveError;

/// The outcome of resolving one cache key: the fetched object on success,
/// or the error to be written into every referencing node's `$error`.
pub type ResolutionFuture = Shared<BoxFuture<'static, Result<Value, ResolveError>>>;

/// Mapping from cache key to the shared future performing that
/// resolution. A second namespace for raw upstream-proxy memoization is
/// left as a future extension point — this crate's fetcher has no
/// caller-visible need for it yet, so only the resolution-level map is
/// built.
#[derive(Default)]
pub struct RequestMemo {
    resolutions: Mutex<HashMap<String, ResolutionFuture>>,
}

impl RequestMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing future for `cache_key`, or creates one from
    /// `make` and stores it. `make` is only invoked on a genuine miss.
    pub fn get_or_create(
        &self,
        cache_key: &str,
        make: impl FnOnce() -> BoxFuture<'static, Result<Value, ResolveError>>,
    ) -> ResolutionFuture {
        use futures::FutureExt;

        let mut guard = self.resolutions.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard.get(cache_key) {
            return existing.clone();
        }
        let shared = make().shared();
        guard.insert(cache_key.to_string(), shared.clone());
        shared
    }
}
