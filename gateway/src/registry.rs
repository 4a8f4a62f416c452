//! Service registry.
//!
//! A static, immutable-after-init mapping from service name to base URL,
//! built once from `SERVICE_<NAME>=<base_url>` environment variables.
//! The suffix is lowercased and underscores become dashes, e.g.
//! `SERVICE_USER_PROFILES=http://profiles.internal` registers
//! `user-profiles`.

use std::collections::BTreeMap;
use std::env;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid base URL for service {service:?}: {source}")]
    InvalidUrl {
        service: String,
        #[source]
        source: url::ParseError,
    },
}

/// Service name -> base URL. A `BTreeMap` keeps `names()` output
/// (health endpoint, openapi aggregation order) deterministic without an
/// extra sort at each call site.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry(BTreeMap<String, Url>);

impl ServiceRegistry {
    /// Scans `SERVICE_<NAME>` environment variables into a registry.
    /// Unrelated env vars (including the bare `SERVICE_` prefix with no
    /// suffix) are ignored.
    pub fn from_env() -> Result<Self, RegistryError> {
        let mut services = BTreeMap::new();
        for (key, value) in env::vars() {
            let Some(suffix) = key.strip_prefix("SERVICE_") else {
                continue;
            };
            if suffix.is_empty() {
                continue;
            }
            let name = suffix.to_ascii_lowercase().replace('_', "-");
            let url = Url::parse(&value).map_err(|source| RegistryError::InvalidUrl {
                service: name.clone(),
                source,
            })?;
            services.insert(name, url);
        }
        Ok(Self(services))
    }

    /// Builds a registry directly from name/base-URL pairs, bypassing
    /// environment scanning. Used by unit and integration tests, and
    /// available for embedders that assemble the registry themselves.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, &'static str)>,
        S: Into<String>,
    {
        let mut services = BTreeMap::new();
        for (name, url) in pairs {
            services.insert(name.into(), Url::parse(url).expect("valid test URL"));
        }
        Self(services)
    }

    pub fn base_url(&self, service: &str) -> Option<&Url> {
        self.0.get(service)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.0.contains_key(service)
    }

    /// Service names in sorted order, as surfaced by the health endpoint.
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Url)> {
        self.0.iter().map(|(name, url)| (name.as_str(), url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_dashes_the_suffix() {
        // env::set_var is process-global; keep this test single-threaded
        // in intent by using a name unlikely to collide.
        unsafe {
            env::set_var("SERVICE_USER_PROFILES", "http://profiles.internal");
        }
        let registry = ServiceRegistry::from_env().unwrap();
        assert!(registry.contains("user-profiles"));
        unsafe {
            env::remove_var("SERVICE_USER_PROFILES");
        }
    }

    #[test]
    fn names_are_sorted() {
        let registry = ServiceRegistry::from_pairs([
            ("zeta", "http://z"),
            ("alpha", "http://a"),
        ]);
        assert_eq!(registry.names(), vec!["alpha".to_string(), "zeta".to_string()]);
    }
}
