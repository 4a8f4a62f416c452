use serde_json::Value;

/// The error taxonomy for the reference-resolution path.
///
/// Every variant here is confined to the offending reference node: the
/// traversal engine catches these and writes them into `$error` rather than
/// failing the surrounding request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown service {0:?}")]
    UnknownService(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream returned status {status}")]
    UpstreamStatus { status: u16, data: Value },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("id mismatch on merge: existing {existing:?}, fetched {fetched:?}")]
    UpdateMismatch { existing: Value, fetched: Value },

    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
}

impl ResolveError {
    /// The HTTP status this error would carry if it had occurred on the
    /// primary request path instead of during reference resolution.
    pub fn status(&self) -> u16 {
        match self {
            ResolveError::UnknownService(_) => 404,
            ResolveError::Timeout => 504,
            ResolveError::UpstreamStatus { status, .. } => *status,
            ResolveError::Transport(_) => 502,
            ResolveError::UpdateMismatch { .. } => 409,
            ResolveError::NotImplemented(_) => 501,
        }
    }

    /// Render this error into the `$error` payload written onto a reference
    /// node: `{"status": ..., "data": ...}` for upstream failures, and an
    /// `update_mismatch`-tagged object for id conflicts.
    pub fn to_error_payload(&self) -> Value {
        match self {
            ResolveError::UnknownService(service) => serde_json::json!({
                "status": self.status(),
                "data": { "detail": format!("unknown service {service:?}") },
            }),
            ResolveError::Timeout => serde_json::json!({ "status": 504 }),
            ResolveError::UpstreamStatus { status, data } => serde_json::json!({
                "status": status,
                "data": data,
            }),
            ResolveError::Transport(message) => serde_json::json!({
                "status": 502,
                "data": { "detail": message },
            }),
            ResolveError::UpdateMismatch { existing, fetched } => serde_json::json!({
                "error": "update_mismatch",
                "data": fetched,
                "values": existing,
            }),
            ResolveError::NotImplemented(what) => serde_json::json!({
                "status": 501,
                "data": { "detail": format!("{what} is not implemented") },
            }),
        }
    }
}
