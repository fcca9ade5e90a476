use std::sync::Arc;

use crate::config::Config;
use crate::jobs::service::JobBoard;
use crate::session::SessionController;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionController,
    pub jobs: Arc<JobBoard>,
    pub config: Config,
    /// Masked backend URL, shown next to probe results.
    pub backend_endpoint: String,
}
