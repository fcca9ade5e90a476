use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns a simple status object with service version and connection mode.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let session = state.session.snapshot();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "jobflow-api",
        "mode": session.mode,
        "backendConfigured": state.config.supabase_url.is_some(),
    }))
}
