//! Traversal engine and resolution coordinator.
//!
//! Descending into a JSON tree and installing a transient `_parent`
//! back-pointer before recursing into children is naturally a mutable,
//! aliasing back-edge — which doesn't fit Rust's borrow rules directly.
//! This module sidesteps it: [`walk`] is a by-value transform, `Value in
//! -> Value out`, and the `_parent` pointer handed to a child is a
//! *clone* of the enclosing context rather than a true back-edge — there
//! is never a cycle to break, so there is nothing to clean up on the way
//! out.
//!
//! Concurrency is modeled with `futures::join!`/`join_all` rather than
//! `tokio::spawn`: every sibling reference and every sibling subtree is
//! polled concurrently within the same task, matching a single-threaded
//! cooperative event loop without requiring `Send + 'static` task
//! boundaries around borrowed JSON.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{Map, Value};

use crate::cache_key;
use crate::error::ResolveError;
use crate::fetcher::{FetchBody, FetchRequest, Fetcher};
use crate::memo::RequestMemo;
use crate::placeholder;
use crate::reference::{self, ERROR, ID, PARENT, REL, REL_PARAMS};
use crate::shared_cache::{SharedCache, DEFAULT_TTL};

/// Per-request configuration and collaborators threaded through every
/// level of the walk as an explicit argument, never as module globals.
/// Cheap to clone — every field is an `Arc` or a `Copy` value.
#[derive(Clone)]
pub struct ResolveContext {
    fetcher: Arc<dyn Fetcher>,
    shared_cache: Arc<dyn SharedCache>,
    memo: Arc<RequestMemo>,
    /// Depth bound beyond which nodes are left untouched.
    max_level: Option<usize>,
    /// Bound applied to each upstream fetch issued while resolving a
    /// reference.
    fetch_timeout: Duration,
}

impl ResolveContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, shared_cache: Arc<dyn SharedCache>) -> Self {
        Self {
            fetcher,
            shared_cache,
            memo: Arc::new(RequestMemo::new()),
            max_level: None,
            fetch_timeout: Duration::from_secs(3),
        }
    }

    pub fn with_max_level(mut self, max_level: Option<usize>) -> Self {
        self.max_level = max_level;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Walks `value`, resolving every `$rel` reference marker found, and
/// returns the mutated tree. This is the entry point used by the gateway
/// handler on a freshly-fetched response body.
pub fn walk(value: Value, ctx: ResolveContext) -> BoxFuture<'static, Value> {
    walk_at(value, None, 0, ctx)
}

fn walk_at(value: Value, parent_ctx: Option<Value>, depth: usize, ctx: ResolveContext) -> BoxFuture<'static, Value> {
    async move {
        match value {
            Value::Array(items) => {
                let futures: Vec<_> = items
                    .into_iter()
                    .map(|item| walk_at(item, parent_ctx.clone(), depth + 1, ctx.clone()))
                    .collect();
                Value::Array(join_all(futures).await)
            }
            Value::Object(map) => walk_object(map, parent_ctx, depth, ctx).await,
            other => other,
        }
    }
    .boxed()
}

async fn walk_object(map: Map<String, Value>, parent_ctx: Option<Value>, depth: usize, ctx: ResolveContext) -> Value {
    if reference::is_already_resolved(&map) {
        return Value::Object(map);
    }
    if ctx.max_level.is_some_and(|max| depth > max) {
        return Value::Object(map);
    }

    // The context a child (or this node's own reference resolution) sees:
    // this node's fields plus a transient `_parent` pointing at the
    // enclosing object, enabling `{_parent.field}` placeholders.
    let self_ctx = match &parent_ctx {
        Some(parent) => {
            let mut with_parent = map.clone();
            with_parent.insert(PARENT.to_string(), parent.clone());
            Value::Object(with_parent)
        }
        None => Value::Object(map.clone()),
    };

    let keys: Vec<String> = map.keys().cloned().collect(); // snapshot: resolution below adds keys to `map`
    let mut map = map;

    let mut child_futures: Vec<BoxFuture<'static, (String, Value)>> = Vec::new();
    let is_reference = reference::is_reference_marker(&map);
    // Taken before the removal loop below strips fields like `id` and
    // `$rel_params` out of `map` for per-key walking — resolution needs
    // the node's full, untouched field set.
    let node_snapshot = is_reference.then(|| map.clone());

    for key in keys {
        if key == PARENT || key == REL {
            continue;
        }
        let child = map.remove(&key).unwrap_or(Value::Null);
        let child_parent = self_ctx.clone();
        let child_ctx = ctx.clone();
        child_futures.push(
            async move {
                let resolved = walk_at(child, Some(child_parent), depth + 1, child_ctx).await;
                (key, resolved)
            }
            .boxed(),
        );
    }

    let resolve_future: Option<BoxFuture<'static, (Map<String, Value>, Option<ResolveError>)>> =
        node_snapshot.map(|node_snapshot| {
            let resolve_ctx = self_ctx.clone();
            let child_ctx = ctx.clone();
            resolve_reference(node_snapshot, resolve_ctx, child_ctx).boxed()
        });

    let (children, resolved) = futures::join!(join_all(child_futures), async {
        match resolve_future {
            Some(fut) => Some(fut.await),
            None => None,
        }
    });

    for (key, value) in children {
        map.insert(key, value);
    }

    if let Some((resolved_fields, _error)) = resolved {
        for (key, value) in resolved_fields {
            map.insert(key, value);
        }
    }

    Value::Object(map)
}

/// Resolves a single reference node. Returns the full set of fields to
/// merge back onto the node — the rewritten `$rel`, either the fetched
/// object's fields or an `$error`, but never touches fields the
/// sibling-descent pass already produced.
fn resolve_reference(
    node: Map<String, Value>,
    ctx_value: Value,
    ctx: ResolveContext,
) -> BoxFuture<'static, (Map<String, Value>, Option<ResolveError>)> {
    async move {
        let mut out = Map::new();

        let rel_template = reference::rel_path_str(&node);

        let rel_path: Vec<String> = rel_template
            .split('/')
            .map(|segment| placeholder::resolve_str(segment, &ctx_value))
            .collect();
        out.insert(REL.to_string(), Value::String(rel_path.join("/")));

        if rel_path.len() < 2 {
            let err = ResolveError::UpstreamStatus {
                status: 400,
                data: serde_json::json!({ "detail": format!("malformed $rel {rel_template:?}") }),
            };
            out.insert(ERROR.to_string(), err.to_error_payload());
            return (out, Some(err));
        }

        let id = node
            .get(ID)
            .map(|v| placeholder::resolve(v, &ctx_value))
            .and_then(|v| reference::value_to_id_string(&v));

        let rel_params = node.get(REL_PARAMS).and_then(Value::as_object).map(|params| {
            let mut resolved = Map::new();
            for (k, v) in params {
                resolved.insert(k.clone(), placeholder::resolve(v, &ctx_value));
            }
            resolved
        });

        let cache_key = cache_key::build(&rel_path, id.as_deref(), rel_params.as_ref());

        let fetcher = ctx.fetcher.clone();
        let shared_cache = ctx.shared_cache.clone();
        let memo = ctx.memo.clone();
        let walk_ctx = ctx.clone();
        let timeout = ctx.fetch_timeout;
        let fetch_key = cache_key.clone();
        let fetch_rel_path = rel_path.clone();
        let fetch_id = id.clone();
        let fetch_params = rel_params.clone();

        let result = memo
            .get_or_create(&cache_key, move || {
                tracing::debug!(cache_key = %fetch_key, "resolving reference, no in-flight fetch yet");
                fetch_and_walk(
                    fetcher,
                    shared_cache,
                    fetch_key,
                    fetch_rel_path,
                    fetch_id,
                    fetch_params,
                    timeout,
                    walk_ctx,
                )
            })
            .await;

        match result {
            Ok(fetched) => {
                let Value::Object(fetched_map) = fetched else {
                    out.insert(ERROR.to_string(), serde_json::json!({
                        "status": 502,
                        "data": { "detail": "upstream reference response was not a JSON object" },
                    }));
                    return (out, None);
                };

                // Compared via the normalized id string, since an id may
                // arrive as either a JSON string or a number, rather than
                // raw `Value` equality, so `"id": 42` and `"id": "42"` are
                // not treated as a mismatch.
                if let (Some(existing), Some(fetched)) = (reference::id_str(&node), reference::id_str(&fetched_map)) {
                    if existing != fetched {
                        tracing::warn!(cache_key = %cache_key, %existing, %fetched, "id mismatch on reference merge");
                        let err = ResolveError::UpdateMismatch {
                            existing: node.get(ID).cloned().unwrap_or(Value::Null),
                            fetched: Value::Object(fetched_map),
                        };
                        out.insert(ERROR.to_string(), err.to_error_payload());
                        return (out, Some(err));
                    }
                }

                for (key, value) in fetched_map {
                    if key == REL {
                        continue; // $rel was already rewritten above, never overwritten by fetched data
                    }
                    out.insert(key, value);
                }
                (out, None)
            }
            Err(err) => {
                tracing::warn!(cache_key = %cache_key, error = %err, "reference resolution failed, isolating to this node");
                out.insert(ERROR.to_string(), err.to_error_payload());
                (out, Some(err))
            }
        }
    }
    .boxed()
}

/// Builds the memoized fetch-and-recurse future: the fetched object is
/// itself walked for further references before being merged, so nested
/// references dedupe through the same per-request memo. A freshly-fetched
/// body is walked fresh — unbounded depth, reset to the root — since the
/// enclosing walk's depth bound and position describe the *caller's*
/// tree, not the independent document this fetch just returned.
#[allow(clippy::too_many_arguments)]
fn fetch_and_walk(
    fetcher: Arc<dyn Fetcher>,
    shared_cache: Arc<dyn SharedCache>,
    cache_key: String,
    rel_path: Vec<String>,
    id: Option<String>,
    rel_params: Option<Map<String, Value>>,
    timeout: Duration,
    walk_ctx: ResolveContext,
) -> BoxFuture<'static, Result<Value, ResolveError>> {
    async move {
        // A fresh context, not `walk_ctx` itself: the fetched body is an
        // independent document, so it gets its own depth budget rather
        // than inheriting the enclosing walk's `max_level` and depth.
        let fresh_ctx = ResolveContext {
            max_level: None,
            ..walk_ctx
        };

        if let Some(cached) = shared_cache.get(&cache_key).await {
            tracing::debug!(cache_key = %cache_key, "shared cache hit, skipping upstream fetch");
            return Ok(walk_at(cached, None, 0, fresh_ctx).await);
        }

        let service = rel_path[1].clone();
        let segments = &rel_path[2..];

        let path = match (&id, &rel_params) {
            (Some(id), _) => {
                let mut path = segments.join("/");
                if !path.is_empty() {
                    path.push('/');
                }
                path.push_str(id);
                path
            }
            (None, Some(_)) => {
                tracing::warn!(cache_key = %cache_key, "$rel_params without id is not implemented (lookup mode)");
                return Err(ResolveError::NotImplemented(
                    "$rel_params without id (lookup mode)",
                ));
            }
            (None, None) => segments.join("/"),
        };

        let request = FetchRequest {
            timeout: Some(timeout),
            ..FetchRequest::get(service, path)
        };

        let response = fetcher.fetch(request).await?;

        if !response.is_ok() {
            let data = response.as_json().cloned().unwrap_or(Value::Null);
            return Err(ResolveError::UpstreamStatus {
                status: response.status,
                data,
            });
        }

        let fetched = match &response.body {
            FetchBody::Json(value) => value.clone(),
            FetchBody::Raw { .. } => {
                return Err(ResolveError::UpstreamStatus {
                    status: response.status,
                    data: serde_json::json!({ "detail": "reference response was not JSON" }),
                });
            }
        };

        if !response.is_no_cache() {
            shared_cache.set(&cache_key, &fetched, DEFAULT_TTL).await;
        }

        Ok(walk_at(fetched, None, 0, fresh_ctx).await)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FetchResponse;
    use crate::shared_cache::NoopSharedCache;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct StubFetcher {
        responses: StdMutex<std::collections::HashMap<String, (u16, Value)>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        fn new(responses: Vec<(&str, u16, Value)>) -> Self {
            Self {
                responses: StdMutex::new(
                    responses
                        .into_iter()
                        .map(|(k, status, body)| (k.to_string(), (status, body)))
                        .collect(),
                ),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = format!("{}/{}", request.service, request.path);
            let guard = self.responses.lock().unwrap();
            let (status, body) = guard
                .get(&key)
                .cloned()
                .unwrap_or((404, json!({"detail": "not found"})));
            Ok(FetchResponse {
                status,
                headers: http::HeaderMap::new(),
                body: FetchBody::Json(body),
            })
        }
    }

    fn ctx(fetcher: Arc<dyn Fetcher>) -> ResolveContext {
        ResolveContext::new(fetcher, Arc::new(NoopSharedCache))
    }

    /// A [`SharedCache`] pre-populated with fixed entries, recording
    /// every key it was asked for.
    struct StubSharedCache {
        entries: std::collections::HashMap<String, Value>,
        gets: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl crate::shared_cache::SharedCache for StubSharedCache {
        async fn get(&self, key: &str) -> Option<Value> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.entries.get(key).cloned()
        }

        async fn set(&self, _key: &str, _value: &Value, _ttl: std::time::Duration) {}
    }

    #[tokio::test]
    async fn shared_store_hit_skips_the_upstream_fetch() {
        let fetcher = Arc::new(StubFetcher::new(vec![]));
        let shared_cache = Arc::new(StubSharedCache {
            entries: std::collections::HashMap::from([(
                "/users/profiles/42".to_string(),
                json!({"id": "42", "name": "Ada"}),
            )]),
            gets: AtomicUsize::new(0),
        });
        let ctx = ResolveContext::new(fetcher.clone(), shared_cache.clone());
        let payload = json!({"author": {"$rel": "/users/profiles", "id": "42"}});

        let result = walk(payload, ctx).await;

        assert_eq!(result["author"]["name"], json!("Ada"));
        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(shared_cache.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resolves_a_simple_reference() {
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "users/profiles/42",
            200,
            json!({"id": "42", "name": "Ada"}),
        )]));
        let payload = json!({"author": {"$rel": "/users/profiles", "id": "42"}});

        let result = walk(payload, ctx(fetcher)).await;

        assert_eq!(
            result,
            json!({"author": {"$rel": "/users/profiles", "id": "42", "name": "Ada"}})
        );
    }

    #[tokio::test]
    async fn no_parent_leakage_through_nested_lists() {
        // Two enclosing object levels between the tenant field and the
        // reference node (`wrapper`, then the list), so `_parent._parent`
        // walks list -> wrapper -> root.
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "catalog/items/t1/99",
            200,
            json!({"id": "99", "title": "Widget"}),
        )]));
        let payload = json!({
            "tenant": "t1",
            "wrapper": {
                "items": [{"$rel": "/catalog/items", "id": "{_parent._parent.tenant}/99"}]
            }
        });

        let result = walk(payload, ctx(fetcher)).await;

        let rendered = result.to_string();
        assert!(!rendered.contains("_parent"));
        assert_eq!(result["wrapper"]["items"][0]["id"], json!("t1/99"));
        assert_eq!(result["wrapper"]["items"][0]["title"], json!("Widget"));
    }

    #[tokio::test]
    async fn deduplicates_fetches_sharing_a_cache_key() {
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "users/profiles/42",
            200,
            json!({"id": "42", "name": "Ada"}),
        )]));
        let payload = json!({
            "author": {"$rel": "/users/profiles", "id": "42"},
            "reviewer": {"$rel": "/users/profiles", "id": "42"}
        });

        let result = walk(payload, ctx(fetcher.clone())).await;

        assert_eq!(result["author"]["name"], json!("Ada"));
        assert_eq!(result["reviewer"]["name"], json!("Ada"));
        assert_eq!(fetcher.call_count(), 1);
    }

    #[tokio::test]
    async fn failure_is_isolated_to_the_offending_node() {
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "users/profiles/1",
            200,
            json!({"id": "1", "name": "Ada"}),
        )]));
        let payload = json!({
            "good": {"$rel": "/users/profiles", "id": "1"},
            "bad": {"$rel": "/users/profiles", "id": "404"}
        });

        let result = walk(payload, ctx(fetcher)).await;

        assert_eq!(result["good"]["name"], json!("Ada"));
        assert!(result["good"].get("$error").is_none());
        assert_eq!(result["bad"]["$error"]["status"], json!(404));
    }

    #[tokio::test]
    async fn id_mismatch_writes_update_mismatch_error() {
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "users/profiles/42",
            200,
            json!({"id": "43", "name": "X"}),
        )]));
        let payload = json!({"$rel": "/users/profiles", "id": "42"});

        let result = walk(payload, ctx(fetcher)).await;

        assert_eq!(result["$error"]["error"], json!("update_mismatch"));
        assert!(result.get("name").is_none());
    }

    #[tokio::test]
    async fn idempotent_rewalk_of_already_resolved_tree() {
        let fetcher = Arc::new(StubFetcher::new(vec![]));
        let payload = json!({
            "author": {"$rel": "/users/profiles", "id": "42", "name": "Ada", "$rel_at": true}
        });

        let result = walk(payload.clone(), ctx(fetcher.clone())).await;

        assert_eq!(result, payload);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn max_level_stops_descent() {
        let fetcher = Arc::new(StubFetcher::new(vec![(
            "users/profiles/42",
            200,
            json!({"id": "42", "name": "Ada"}),
        )]));
        let payload = json!({"outer": {"author": {"$rel": "/users/profiles", "id": "42"}}});

        let result = walk(payload.clone(), ctx(fetcher.clone()).with_max_level(Some(0))).await;

        assert_eq!(result, payload);
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn docs_path_exception_is_the_fetchers_responsibility_not_walks() {
        // The traversal engine has no opinion on URL shape; this just
        // documents that resolve_reference always routes through the
        // `Fetcher` trait, which owns the docs/redoc exception.
        let fetcher = Arc::new(StubFetcher::new(vec![]));
        assert_eq!(fetcher.call_count(), 0);
        let _ = ctx(fetcher);
    }

    /// A [`Fetcher`] that always fails with a fixed error, used to drive
    /// the timeout/4xx/transport-error edge-case table below.
    struct FailingFetcher(ResolveError);

    #[async_trait::async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _request: FetchRequest) -> Result<FetchResponse, ResolveError> {
            Err(self.0.clone())
        }
    }

    #[rstest]
    #[case::timeout(ResolveError::Timeout, 504)]
    #[case::transport(ResolveError::Transport("connection refused".to_string()), 502)]
    #[case::upstream_4xx(
        ResolveError::UpstreamStatus { status: 404, data: json!({"detail": "nope"}) },
        404
    )]
    #[case::upstream_5xx(
        ResolveError::UpstreamStatus { status: 500, data: json!({"detail": "boom"}) },
        500
    )]
    #[tokio::test]
    async fn failing_fetch_writes_the_expected_status_into_error(
        #[case] error: ResolveError,
        #[case] expected_status: u16,
    ) {
        let fetcher = Arc::new(FailingFetcher(error));
        let payload = json!({"$rel": "/users/profiles", "id": "1"});

        let result = walk(payload, ctx(fetcher)).await;

        assert_eq!(result["$error"]["status"], json!(expected_status));
    }
}
