//! Placeholder resolver.
//!
//! Substitutes `{jsonpath}` templates in a string against a context object.
//! `jsonpath_lib` requires an explicit root, so expressions given without
//! one (bare `_parent.id`, `owner_id`) are given an implicit `$.` prefix,
//! keeping the permissive grammar relation paths and query parameters
//! rely on.

use serde_json::Value;
use std::sync::OnceLock;
use std::sync::Mutex;

/// Matches the outermost `{...}` placeholders in a template string.
fn placeholder_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(r"\{([^{}]+)\}").expect("valid regex"))
}

/// `jsonpath_lib`'s `Compiled` selector isn't `Send`-friendly to cache
/// across a `OnceLock` safely under concurrent access, so each call just
/// compiles fresh; a mutex only guards against the crate's internal
/// thread-unsafe parser state on older versions.
static JSONPATH_LOCK: Mutex<()> = Mutex::new(());

/// Normalizes a bare JSONPath expression (`_parent.id`, `owner_id`) into
/// one `jsonpath_lib` accepts (`$._parent.id`, `$.owner_id`).
fn normalize_expr(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.starts_with('$') {
        trimmed.to_string()
    } else {
        format!("$.{trimmed}")
    }
}

/// Evaluates a single JSONPath expression against `ctx`, returning the
/// first match's value, if any.
fn first_match(expr: &str, ctx: &Value) -> Option<Value> {
    let normalized = normalize_expr(expr);
    let _guard = JSONPATH_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let matches = jsonpath_lib::select(ctx, &normalized).ok()?;
    matches.into_iter().next().cloned()
}

/// Renders a matched JSON value into the surrounding string: strings are
/// inlined verbatim, everything else uses its compact JSON rendering.
fn value_to_placeholder_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitutes every `{expr}` occurrence in `template` by evaluating `expr`
/// as a JSONPath query against `ctx`. Non-string values pass through
/// unchanged. An expression with no match resolves silently to an empty
/// string.
pub fn resolve(template: &Value, ctx: &Value) -> Value {
    let Value::String(s) = template else {
        return template.clone();
    };

    let mut out = String::with_capacity(s.len());
    let mut last_end = 0;
    for caps in placeholder_regex().captures_iter(s) {
        let whole = caps.get(0).expect("capture 0 always present");
        let expr = caps.get(1).expect("capture 1 is the mandatory group").as_str();

        out.push_str(&s[last_end..whole.start()]);
        let replacement = first_match(expr, ctx)
            .as_ref()
            .map(value_to_placeholder_text)
            .unwrap_or_default();
        out.push_str(&replacement);
        last_end = whole.end();
    }
    out.push_str(&s[last_end..]);

    Value::String(out)
}

/// Convenience for resolving a plain `&str` template, returning an owned
/// `String` rather than a `Value`. Used for `$rel` path segments.
pub fn resolve_str(template: &str, ctx: &Value) -> String {
    match resolve(&Value::String(template.to_string()), ctx) {
        Value::String(s) => s,
        _ => unreachable!("resolve() on a Value::String always returns Value::String"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn passes_through_non_strings() {
        let ctx = json!({});
        assert_eq!(resolve(&json!(42), &ctx), json!(42));
        assert_eq!(resolve(&json!(null), &ctx), json!(null));
    }

    #[test]
    fn substitutes_a_field_reference() {
        let ctx = json!({"owner_id": "7"});
        assert_eq!(resolve_str("{owner_id}", &ctx), "7");
    }

    #[test]
    fn substitutes_multiple_placeholders() {
        let ctx = json!({"a": "x", "b": "y"});
        assert_eq!(resolve_str("{a}-{b}", &ctx), "x-y");
    }

    #[test]
    fn unmatched_expression_resolves_to_empty() {
        let ctx = json!({});
        assert_eq!(resolve_str("prefix-{missing}-suffix", &ctx), "prefix--suffix");
    }

    #[test]
    fn resolves_parent_chain() {
        let ctx = json!({
            "_parent": {
                "_parent": {"tenant": "t1"}
            }
        });
        assert_eq!(resolve_str("{_parent._parent.tenant}/99", &ctx), "t1/99");
    }

    #[test]
    fn numeric_match_renders_without_quotes() {
        let ctx = json!({"id": 42});
        assert_eq!(resolve_str("{id}", &ctx), "42");
    }
}
