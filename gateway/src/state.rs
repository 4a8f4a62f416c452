//! Process-scoped, read-only-after-init context, passed explicitly to
//! every handler rather than stashed in module globals.
//!
//! One [`AppState`] is built in `main` and cloned (cheaply — every field
//! is an `Arc`) into every request.

use std::sync::Arc;
use std::time::Duration;

use gateway_core::{Fetcher, SharedCache};

use crate::registry::ServiceRegistry;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub fetcher: Arc<dyn Fetcher>,
    pub shared_cache: Arc<dyn SharedCache>,
    pub cors_enabled: bool,
    pub reference_fetch_timeout: Duration,
    pub reference_max_level: Option<usize>,
}
