//! Cache-key builder.

use serde_json::{Map, Value};

/// Builds the stable cache key for a reference fetch: the relation path
/// joined with `/`, plus `/id` if present, plus `?`-prefixed urlencoded
/// `$rel_params` if present.
///
/// Callers must have already resolved placeholders in `relation` and in
/// any `$rel_params` values; this function only joins and encodes.
pub fn build(relation: &[String], id: Option<&str>, rel_params: Option<&Map<String, Value>>) -> String {
    let mut key = relation.join("/");

    if let Some(id) = id {
        key.push('/');
        key.push_str(id);

        if let Some(params) = rel_params {
            if !params.is_empty() {
                key.push('?');
                key.push_str(&encode_params(params));
            }
        }
    }

    key
}

fn encode_params(params: &Map<String, Value>) -> String {
    let pairs: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (k.clone(), param_value_to_string(v)))
        .collect();
    serde_urlencoded::to_string(pairs).unwrap_or_default()
}

fn param_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn joins_relation_without_id() {
        let relation = vec!["".to_string(), "users".to_string(), "profiles".to_string()];
        assert_eq!(build(&relation, None, None), "/users/profiles");
    }

    #[test]
    fn appends_id() {
        let relation = vec!["".to_string(), "users".to_string(), "profiles".to_string()];
        assert_eq!(build(&relation, Some("42"), None), "/users/profiles/42");
    }

    #[test]
    fn appends_encoded_params_only_with_id() {
        let relation = vec!["".to_string(), "users".to_string(), "profiles".to_string()];
        let params = json!({"active": "true"});
        let params = params.as_object().unwrap();
        assert_eq!(
            build(&relation, Some("42"), Some(params)),
            "/users/profiles/42?active=true"
        );
    }

    #[test]
    fn is_stable_across_calls() {
        let relation = vec!["svc".to_string(), "a".to_string()];
        assert_eq!(build(&relation, Some("1"), None), build(&relation, Some("1"), None));
    }
}
