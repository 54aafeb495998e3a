use std::sync::Arc;

use crate::boundary::AnalysisBoundary;
use crate::config::Config;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable backend. Default: `BackendClient` pointed at `BACKEND_URL`.
    pub backend: Arc<dyn AnalysisBoundary>,
    pub config: Config,
}
