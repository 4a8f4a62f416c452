//! Shared (cross-request) cache contract.
//!
//! Any key/value store with TTL-bounded `GET`/`SET` satisfies this trait.
//! The resolution coordinator treats every error here as a miss or a
//! no-op write and logs it — the reference-resolution path must keep
//! working with the shared cache fully unavailable.

use std::time::Duration;

use serde_json::Value;

/// TTL applied to every shared-cache write.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[async_trait::async_trait]
pub trait SharedCache: Send + Sync {
    /// Returns `None` on a miss *or* any store-level failure; callers
    /// cannot distinguish the two, matching the "treated as a miss" policy.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Best-effort write; failures are swallowed by the implementation.
    async fn set(&self, key: &str, value: &Value, ttl: Duration);
}

/// A [`SharedCache`] that never hits and silently drops writes, used when
/// no shared-cache backend is configured.
pub struct NoopSharedCache;

#[async_trait::async_trait]
impl SharedCache for NoopSharedCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn set(&self, _key: &str, _value: &Value, _ttl: Duration) {}
}
