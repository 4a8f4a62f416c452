//! The `$rel` reference-marker dialect.

use serde_json::{Map, Value};

/// Field name a JSON object must carry (as a string value) to be treated as
/// a reference marker.
pub const REL: &str = "$rel";
/// Terminal resource identifier appended to the fetch URL.
pub const ID: &str = "id";
/// Query parameters to append to the fetch, values may contain placeholders.
pub const REL_PARAMS: &str = "$rel_params";
/// Presence marks the node as already resolved; traversal must skip it.
pub const REL_AT: &str = "$rel_at";
/// Requests that a list response collapse to its first element.
pub const REL_IS_LOOKUP: &str = "$rel_is_lookup";
/// Written by the resolver on failure.
pub const ERROR: &str = "$error";
/// Transient back-pointer to the enclosing object, installed and removed
/// within a single traversal frame and never observable in a returned
/// payload.
pub const PARENT: &str = "_parent";

/// Returns `true` if `node` is a reference marker: an object carrying a
/// string-valued `$rel` field.
pub fn is_reference_marker(node: &Map<String, Value>) -> bool {
    matches!(node.get(REL), Some(Value::String(_)))
}

/// Returns `true` if `node` has already been resolved and the traversal
/// must not descend into its subtree.
pub fn is_already_resolved(node: &Map<String, Value>) -> bool {
    node.contains_key(REL_AT)
}

/// Reads the `$rel` string off a marker object. Panics if called on a
/// non-marker; callers must check [`is_reference_marker`] first.
pub fn rel_path_str(node: &Map<String, Value>) -> &str {
    node.get(REL)
        .and_then(Value::as_str)
        .expect("rel_path_str called on a non-reference-marker node")
}

/// Coerces a resolved `id` value (string or number) to the string used in
/// fetch URLs, cache keys, and id-mismatch comparisons.
pub fn value_to_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The terminal `id` field, if present, rendered as the string used in
/// fetch URLs and cache keys.
pub fn id_str(node: &Map<String, Value>) -> Option<String> {
    node.get(ID).and_then(value_to_id_string)
}

/// Whether this node's `$rel_is_lookup` flag is set. Exposed for a future
/// caller to act on; nothing in this crate collapses a list response to
/// its first element yet.
pub fn is_lookup(node: &Map<String, Value>) -> bool {
    matches!(node.get(REL_IS_LOOKUP), Some(Value::Bool(true)))
}
