//! Primary-request-path error taxonomy: the primary request-response
//! path propagates upstream status verbatim.
//!
//! This is deliberately distinct from [`gateway_core::ResolveError`],
//! which is confined to a reference node's `$error`. `GatewayError` is
//! what the top-level proxy handler returns when it fails *before* a
//! body even exists to walk.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use gateway_core::ResolveError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("upstream connection failed: {0}")]
    Transport(String),

    #[error("upstream request timed out")]
    Timeout,
}

impl From<ResolveError> for GatewayError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::UnknownService(service) => GatewayError::UnknownService(service),
            ResolveError::Timeout => GatewayError::Timeout,
            ResolveError::Transport(message) => GatewayError::Transport(message),
            // These variants only ever arise inside reference resolution,
            // never on the primary fetch this error type guards.
            other => GatewayError::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        // UnknownService -> 404, Transport -> 502, Timeout -> 504, each as
        // `{"error": "<error-class>"}`.
        let (status, body) = match &self {
            GatewayError::UnknownService(_) => (StatusCode::NOT_FOUND, json!({ "error": "UnknownService" })),
            GatewayError::Transport(_) => (StatusCode::BAD_GATEWAY, json!({ "error": "Transport" })),
            GatewayError::Timeout => (StatusCode::GATEWAY_TIMEOUT, json!({ "error": "Timeout" })),
        };
        tracing::warn!(error = %self, status = status.as_u16(), "primary request failed");
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use rstest::rstest;

    #[rstest]
    #[case::unknown_service(GatewayError::UnknownService("ghost".to_string()), StatusCode::NOT_FOUND, "UnknownService")]
    #[case::transport(GatewayError::Transport("connection refused".to_string()), StatusCode::BAD_GATEWAY, "Transport")]
    #[case::timeout(GatewayError::Timeout, StatusCode::GATEWAY_TIMEOUT, "Timeout")]
    #[tokio::test]
    async fn maps_to_the_expected_status_and_error_label(
        #[case] error: GatewayError,
        #[case] expected_status: StatusCode,
        #[case] expected_label: &str,
    ) {
        let response = error.into_response();
        assert_eq!(response.status(), expected_status);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], serde_json::json!(expected_label));
    }
}
