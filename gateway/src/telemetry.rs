//! Tracing/logging setup and the synthetic `sentry-trace` header.
//!
//! Real Sentry SDK wiring is out of scope — no Sentry dependency is
//! pulled in — but the header-forwarding contract still needs *a* value
//! when the inbound request doesn't carry one. This generates a
//! syntactically valid trace-id/span-id pair from the process RNG,
//! matching the shape Sentry's SDKs emit
//! (`{trace_id:032x}-{span_id:016x}-{sampled}`), without shipping it
//! anywhere.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Initializes the global `tracing` subscriber: env-filter for level
/// control, JSON formatting outside local development.
pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.use_json_logs() {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
}

/// Synthesizes a `sentry-trace` header value for an inbound request that
/// doesn't already carry one.
pub fn synthesize_sentry_trace() -> String {
    let trace_id = uuid::Uuid::new_v4().simple().to_string();
    let span_id: u64 = rand::random();
    format!("{trace_id}-{span_id:016x}-1")
}

/// Collapses a proxied request's path to `{METHOD} /{service}/{segment}`,
/// appending a literal `/...` when more than one segment was collapsed
/// away, for use as a structured-log / span summary field.
pub fn request_summary(method: &http::Method, service: &str, path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.first() {
        Some(first) if segments.len() > 1 => format!("{method} /{service}/{first}/..."),
        Some(first) => format!("{method} /{service}/{first}"),
        None => format!("{method} /{service}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentry_trace_has_the_expected_shape() {
        let header = synthesize_sentry_trace();
        let parts: Vec<&str> = header.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 32);
        assert_eq!(parts[1].len(), 16);
    }

    #[test]
    fn request_summary_collapses_multi_segment_paths_with_an_ellipsis() {
        let summary = request_summary(&http::Method::GET, "users", "profiles/42");
        assert_eq!(summary, "GET /users/profiles/...");
    }

    #[test]
    fn request_summary_keeps_a_single_segment_path_as_is() {
        let summary = request_summary(&http::Method::GET, "users", "profiles");
        assert_eq!(summary, "GET /users/profiles");
    }

    #[test]
    fn request_summary_handles_an_empty_path() {
        let summary = request_summary(&http::Method::GET, "users", "");
        assert_eq!(summary, "GET /users");
    }
}
