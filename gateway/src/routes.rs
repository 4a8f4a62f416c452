//! Gateway handler: the HTTP-facing entry point.
//!
//! Three routes: a health root, a dedicated `/openapi.json` aggregation
//! route (never proxied, never walked for references), and a catch-all
//! `/{service}/*path` bound to every HTTP method via `axum::routing::any`.

use axum::body::{Body, Bytes};
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use serde_json::Value;

use gateway_core::{FetchBody, FetchRequest, ResolveContext};

use crate::error::GatewayError;
use crate::openapi;
use crate::state::AppState;
use crate::telemetry;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/openapi.json", get(aggregated_openapi))
        .route("/:service/*path", any(proxy))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({ "services": state.registry.names() }))
}

async fn aggregated_openapi(State(state): State<AppState>) -> Json<Value> {
    Json(openapi::aggregate(&state.fetcher, &state.registry).await)
}

async fn proxy(
    State(state): State<AppState>,
    Path((service, path)): Path<(String, String)>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    if method == Method::OPTIONS {
        return preflight_response(&state, &headers);
    }

    if !state.registry.contains(&service) {
        return GatewayError::UnknownService(service).into_response();
    }

    let mut forwarded_headers = headers.clone();
    forwarded_headers.remove(header::CONTENT_LENGTH);
    if !forwarded_headers.contains_key("sentry-trace") {
        if let Ok(value) = HeaderValue::from_str(&telemetry::synthesize_sentry_trace()) {
            forwarded_headers.insert("sentry-trace", value);
        }
    }

    let summary = telemetry::request_summary(&method, &service, &path);
    let span = tracing::info_span!("proxy_request", request.summary = %summary);
    let _entered = span.enter();

    let request = FetchRequest {
        method,
        service: service.clone(),
        path: path.clone(),
        headers: forwarded_headers,
        query,
        body,
        timeout: None,
    };

    let response = match state.fetcher.fetch(request).await {
        Ok(response) => response,
        Err(err) => return GatewayError::from(err).into_response(),
    };

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response_headers = response.headers.clone();
    response_headers.remove(header::CONTENT_LENGTH);

    let should_walk = path != "openapi.json";

    let body = match response.body {
        FetchBody::Json(value) if should_walk => {
            let resolve_ctx = ResolveContext::new(state.fetcher.clone(), state.shared_cache.clone())
                .with_max_level(state.reference_max_level)
                .with_fetch_timeout(state.reference_fetch_timeout);
            let resolved = gateway_core::walk(value, resolve_ctx).await;
            Body::from(serde_json::to_vec(&resolved).unwrap_or_default())
        }
        FetchBody::Json(value) => Body::from(serde_json::to_vec(&value).unwrap_or_default()),
        FetchBody::Raw { bytes, .. } => Body::from(bytes),
    };

    let mut response = Response::builder().status(status).body(body).expect("status/body always valid");
    *response.headers_mut() = response_headers;
    response
}

/// CORS preflight: 204 with the `Access-Control-Allow-*` headers set
/// when enabled and the request carries an `Origin` header.
fn preflight_response(state: &AppState, headers: &HeaderMap) -> Response {
    let Some(origin) = state.cors_enabled.then(|| headers.get(header::ORIGIN)).flatten() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let mut response = StatusCode::NO_CONTENT.into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    response_headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization, Content-Type, sentry-trace"),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS"),
    );
    response
}
