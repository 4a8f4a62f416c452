//! Upstream fetcher contract.
//!
//! `gateway-core` only defines the contract: a single async call that a
//! concrete HTTP client implements. The traversal/resolution engine is
//! generic over this trait so it can be unit-tested with an in-memory
//! stub (see `tests` in [`crate::resolve`]).

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::error::ResolveError;

/// A single outbound call to a named backend service.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: http::Method,
    /// Service name as it appears in the registry (lowercase, dashes).
    pub service: String,
    /// Path appended after the service segment, already joined with `/`
    /// (e.g. `profiles/42`), not URL-encoded by the caller.
    pub path: String,
    pub headers: http::HeaderMap,
    /// Raw (already-encoded) query string, without the leading `?`.
    pub query: Option<String>,
    pub body: Bytes,
    /// `None` means no bound; callers resolving references pass a short
    /// bound (~3s) so a single slow backend can't stall the whole tree.
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn get(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: http::Method::GET,
            service: service.into(),
            path: path.into(),
            headers: http::HeaderMap::new(),
            query: None,
            body: Bytes::new(),
            timeout: None,
        }
    }
}

/// The body of an upstream response, discriminated by content-type.
#[derive(Debug, Clone)]
pub enum FetchBody {
    Json(Value),
    Raw { bytes: Bytes, content_type: Option<String> },
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub headers: http::HeaderMap,
    pub body: FetchBody,
}

impl FetchResponse {
    /// A status below 400 is treated as success and merged into the
    /// reference node; 3xx responses are not retried or followed here,
    /// they're merged as-is alongside any body they carry.
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }

    /// `Cache-Control: no-cache` gate for the shared-cache write policy.
    pub fn is_no_cache(&self) -> bool {
        self.headers
            .get(http::header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.to_ascii_lowercase().contains("no-cache"))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match &self.body {
            FetchBody::Json(v) => Some(v),
            FetchBody::Raw { .. } => None,
        }
    }
}

/// Performs a single HTTP call to a named backend service.
///
/// Implementations resolve `service` against the service registry, build
/// the URL (honoring the `docs`/`redoc` single-segment exception), issue
/// the call, and classify the body by content-type. A missing service is
/// [`ResolveError::UnknownService`]; a connection failure is
/// [`ResolveError::Transport`]; exceeding `timeout` is
/// [`ResolveError::Timeout`].
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ResolveError>;
}
