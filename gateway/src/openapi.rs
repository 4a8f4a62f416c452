//! OpenAPI document aggregation. Not part of the reference-resolution
//! engine's own scope, but the gateway binary's job to actually do it.
//!
//! Each backend's `openapi.json` is fetched through the same
//! [`gateway_core::Fetcher`] used for proxied requests. `paths` are
//! union-merged with first-writer-wins on collisions (logged); schema
//! names are prefixed `<service>__` and every `$ref` pointer into
//! `#/components/schemas/...` is rewritten to match; security schemes are
//! merged by name.

use std::sync::Arc;

use serde_json::{Map, Value};

use gateway_core::{FetchBody, FetchRequest, Fetcher};

use crate::registry::ServiceRegistry;

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Aggregates every registered backend's OpenAPI document into one.
/// Backends that don't serve `openapi.json` (connection failure, non-200,
/// non-JSON) are skipped with a warning rather than failing the whole
/// aggregation — this endpoint is a convenience view, not a proxied
/// response in the primary request path.
pub async fn aggregate(fetcher: &Arc<dyn Fetcher>, registry: &ServiceRegistry) -> Value {
    let mut paths = Map::new();
    let mut schemas = Map::new();
    let mut security_schemes = Map::new();

    for (service, _base_url) in registry.iter() {
        let document = match fetch_document(fetcher, service).await {
            Some(doc) => doc,
            None => continue,
        };
        merge_document(service, document, &mut paths, &mut schemas, &mut security_schemes);
    }

    let mut components = Map::new();
    components.insert("schemas".to_string(), Value::Object(schemas));
    components.insert("securitySchemes".to_string(), Value::Object(security_schemes));

    serde_json::json!({
        "openapi": "3.0.2",
        "info": { "title": "Aggregated API", "version": "1.0.0" },
        "paths": Value::Object(paths),
        "components": Value::Object(components),
    })
}

async fn fetch_document(fetcher: &Arc<dyn Fetcher>, service: &str) -> Option<Value> {
    let request = FetchRequest::get(service, "openapi.json");
    let response = match fetcher.fetch(request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(%service, error = %err, "failed to fetch backend openapi.json, skipping");
            return None;
        }
    };

    if !response.is_ok() {
        tracing::warn!(%service, status = response.status, "backend openapi.json returned a non-OK status, skipping");
        return None;
    }

    match response.body {
        FetchBody::Json(value) => Some(value),
        FetchBody::Raw { .. } => {
            tracing::warn!(%service, "backend openapi.json was not JSON, skipping");
            None
        }
    }
}

fn merge_document(
    service: &str,
    document: Value,
    paths: &mut Map<String, Value>,
    schemas: &mut Map<String, Value>,
    security_schemes: &mut Map<String, Value>,
) {
    let Value::Object(mut document) = document else {
        return;
    };

    if let Some(Value::Object(service_paths)) = document.remove("paths") {
        for (path, item) in service_paths {
            let rewritten = rewrite_refs(item, service);
            if paths.contains_key(&path) {
                tracing::warn!(%service, %path, "duplicate path across backends, keeping first-registered");
                continue;
            }
            paths.insert(path, rewritten);
        }
    }

    if let Some(Value::Object(mut components)) = document.remove("components") {
        if let Some(Value::Object(service_schemas)) = components.remove("schemas") {
            for (name, schema) in service_schemas {
                let prefixed_name = format!("{service}__{name}");
                schemas.insert(prefixed_name, rewrite_refs(schema, service));
            }
        }

        if let Some(Value::Object(service_security)) = components.remove("securitySchemes") {
            for (name, scheme) in service_security {
                security_schemes.entry(name).or_insert(scheme);
            }
        }
    }
}

/// Rewrites every `#/components/schemas/X` `$ref` pointer found anywhere
/// in `value` to `#/components/schemas/<service>__X`, recursing through
/// arrays and objects.
fn rewrite_refs(value: Value, service: &str) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                if key == "$ref" {
                    if let Value::String(pointer) = &child {
                        if let Some(schema_name) = pointer.strip_prefix(SCHEMA_REF_PREFIX) {
                            out.insert(key, Value::String(format!("{SCHEMA_REF_PREFIX}{service}__{schema_name}")));
                            continue;
                        }
                    }
                    out.insert(key, child);
                } else {
                    out.insert(key, rewrite_refs(child, service));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(|item| rewrite_refs(item, service)).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gateway_core::{FetchResponse, ResolveError};
    use serde_json::json;
    use std::collections::HashMap;

    struct StubFetcher(HashMap<String, Value>);

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, ResolveError> {
            match self.0.get(&request.service) {
                Some(doc) => Ok(FetchResponse {
                    status: 200,
                    headers: http::HeaderMap::new(),
                    body: FetchBody::Json(doc.clone()),
                }),
                None => Ok(FetchResponse {
                    status: 404,
                    headers: http::HeaderMap::new(),
                    body: FetchBody::Json(json!({})),
                }),
            }
        }
    }

    #[tokio::test]
    async fn unions_disjoint_paths_and_prefixes_schema_names() {
        let registry = ServiceRegistry::from_pairs([("users", "http://u"), ("orders", "http://o")]);
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher(HashMap::from([
            (
                "users".to_string(),
                json!({
                    "paths": {"/users/profiles/{id}": {"get": {}}},
                    "components": {"schemas": {"Profile": {"type": "object"}}}
                }),
            ),
            (
                "orders".to_string(),
                json!({
                    "paths": {"/orders/{id}": {"get": {}}},
                    "components": {"schemas": {"Order": {"type": "object"}}}
                }),
            ),
        ])));

        let aggregated = aggregate(&fetcher, &registry).await;

        assert!(aggregated["paths"]["/users/profiles/{id}"].is_object());
        assert!(aggregated["paths"]["/orders/{id}"].is_object());
        assert!(aggregated["components"]["schemas"]["users__Profile"].is_object());
        assert!(aggregated["components"]["schemas"]["orders__Order"].is_object());
    }

    #[tokio::test]
    async fn first_registered_wins_on_path_collision() {
        let registry = ServiceRegistry::from_pairs([("a", "http://a"), ("b", "http://b")]);
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher(HashMap::from([
            ("a".to_string(), json!({"paths": {"/shared": {"get": {"operationId": "a"}}}})),
            ("b".to_string(), json!({"paths": {"/shared": {"get": {"operationId": "b"}}}})),
        ])));

        let aggregated = aggregate(&fetcher, &registry).await;

        assert_eq!(aggregated["paths"]["/shared"]["get"]["operationId"], json!("a"));
    }

    #[tokio::test]
    async fn rewrites_refs_to_the_prefixed_schema_name() {
        let registry = ServiceRegistry::from_pairs([("users", "http://u")]);
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher(HashMap::from([(
            "users".to_string(),
            json!({
                "paths": {
                    "/users/profiles/{id}": {
                        "get": {"responses": {"200": {"content": {"application/json": {"schema": {"$ref": "#/components/schemas/Profile"}}}}}}
                    }
                },
                "components": {"schemas": {"Profile": {"type": "object"}}}
            }),
        )])));

        let aggregated = aggregate(&fetcher, &registry).await;

        let schema_ref = &aggregated["paths"]["/users/profiles/{id}"]["get"]["responses"]["200"]["content"]
            ["application/json"]["schema"]["$ref"];
        assert_eq!(schema_ref, &json!("#/components/schemas/users__Profile"));
    }

    /// Snapshots the full aggregated document shape. Snapshotting the
    /// pretty-printed JSON directly, rather than via
    /// `insta::assert_json_snapshot!`, keeps the comparison pinned to
    /// `serde_json`'s well-defined (insertion-ordered, 2-space) pretty
    /// printer instead of insta's own `Content` formatting rules.
    #[tokio::test]
    async fn aggregated_document_shape_is_stable() {
        let registry = ServiceRegistry::from_pairs([("users", "http://u")]);
        let fetcher: Arc<dyn Fetcher> = Arc::new(StubFetcher(HashMap::from([(
            "users".to_string(),
            json!({
                "paths": {"/users/profiles/{id}": {"get": {}}},
                "components": {"schemas": {"Profile": {"type": "object"}}}
            }),
        )])));

        let aggregated = aggregate(&fetcher, &registry).await;
        let pretty = serde_json::to_string_pretty(&aggregated).unwrap();

        insta::assert_snapshot!(pretty, @r###"
        {
          "openapi": "3.0.2",
          "info": {
            "title": "Aggregated API",
            "version": "1.0.0"
          },
          "paths": {
            "/users/profiles/{id}": {
              "get": {}
            }
          },
          "components": {
            "schemas": {
              "users__Profile": {
                "type": "object"
              }
            },
            "securitySchemes": {}
          }
        }
        "###);
    }
}
