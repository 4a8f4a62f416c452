//! Configuration.
//!
//! A single [`Config`] is assembled once at startup from environment
//! variables, with `clap`'s `env` feature giving the same knobs as CLI
//! flags for local development. It is constructed once in `main` and
//! handed down as part of `AppState`, never read again from a module
//! global.
//!
//! `clap::Parser` only binds one env var per field, so the repeatable
//! `SERVICE_<NAME>=<base_url>` entries can't be declared declaratively;
//! [`ServiceRegistry::from_env`] scans the process environment directly
//! instead.

use std::time::Duration;

use clap::Parser;

use crate::registry::ServiceRegistry;

/// TTL-bearing timeouts and feature flags for the gateway process.
#[derive(Parser, Debug, Clone)]
#[command(name = "gateway", about = "API aggregation gateway")]
pub struct Config {
    /// Port the HTTP ingress binds to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Shared-cache connection string. Absent means the shared-cache tier
    /// is disabled and every lookup is a miss — resolution must keep
    /// working with the shared cache unavailable.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Whether `redis_url` addresses a cluster rather than a single node.
    #[arg(long, env = "REDIS_CLUSTER", default_value_t = false)]
    pub redis_cluster: bool,

    #[arg(long, env = "REDIS_CONNECT_TIMEOUT", value_parser = humantime::parse_duration, default_value = "250ms")]
    pub redis_connect_timeout: Duration,

    #[arg(long, env = "REDIS_TIMEOUT_GET", value_parser = humantime::parse_duration, default_value = "50ms")]
    pub redis_timeout_get: Duration,

    #[arg(long, env = "REDIS_TIMEOUT_SET", value_parser = humantime::parse_duration, default_value = "50ms")]
    pub redis_timeout_set: Duration,

    /// Enables CORS response headers on proxied requests.
    #[arg(long, env = "DO_ADD_CORS_HEADERS", default_value_t = false)]
    pub cors_enabled: bool,

    /// Timeout applied to a single reference-resolution fetch.
    #[arg(long, env = "REFERENCE_FETCH_TIMEOUT", value_parser = humantime::parse_duration, default_value = "3s")]
    pub reference_fetch_timeout: Duration,

    /// Optional depth bound for the traversal; unset means unbounded.
    #[arg(long, env = "REFERENCE_MAX_LEVEL")]
    pub reference_max_level: Option<usize>,

    #[arg(long, env = "SENTRY_DSN")]
    pub sentry_dsn: Option<String>,

    #[arg(long, env = "SENTRY_ENVIRONMENT", default_value = "development")]
    pub sentry_environment: String,

    #[arg(long, env = "SENTRY_TRACES_SAMPLE_RATE", default_value_t = 0.0)]
    pub sentry_traces_sample_rate: f64,

    #[arg(skip)]
    pub services: ServiceRegistry,
}

impl Config {
    /// Parses CLI args / environment into a [`Config`] and separately
    /// scans `SERVICE_<NAME>` entries into the service registry.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::parse();
        config.services = ServiceRegistry::from_env()?;
        Ok(config)
    }

    /// Structured logs emit JSON outside local development (`tracing` +
    /// `tracing-subscriber`, JSON formatting in non-dev environments).
    pub fn use_json_logs(&self) -> bool {
        self.sentry_environment != "development"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_permissive_for_local_dev() {
        let config = Config::parse_from(["gateway"]);
        assert_eq!(config.port, 8080);
        assert!(config.redis_url.is_none());
        assert!(!config.cors_enabled);
        assert_eq!(config.reference_fetch_timeout, Duration::from_secs(3));
    }

    #[test]
    fn non_development_environment_enables_json_logs() {
        let mut config = Config::parse_from(["gateway"]);
        assert!(!config.use_json_logs());
        config.sentry_environment = "production".to_string();
        assert!(config.use_json_logs());
    }
}
