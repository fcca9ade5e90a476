//! Axum route handlers for the session controller.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::user::{NewProfile, User};
use crate::session::{
    ConnectionMode, ConnectionStatus, LogoutOutcome, RegisterOutcome, Session, SessionState,
};
use crate::state::AppState;

const SETUP_SQL: &str = include_str!("../../sql/setup.sql");

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub current_user: Option<User>,
    pub mode: ConnectionMode,
    pub state: SessionState,
    pub is_demo_mode: bool,
    pub is_setup_required: bool,
    pub is_authenticated: bool,
    pub status_message: String,
    pub latency_ms: Option<u64>,
    pub pending_sync: bool,
}

impl From<Session> for SessionView {
    fn from(session: Session) -> Self {
        SessionView {
            state: session.state(),
            is_demo_mode: session.is_demo_mode(),
            is_setup_required: session.is_setup_required(),
            is_authenticated: session.is_authenticated(),
            current_user: session.current_user,
            mode: session.mode,
            status_message: session.status_message,
            latency_ms: session.latency_ms,
            pending_sync: session.pending_sync,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResponse {
    #[serde(flatten)]
    pub status: ConnectionStatus,
    pub endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub profile: NewProfile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest {
    pub new_password: String,
    pub confirm_password: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// GET /api/v1/session
pub async fn handle_get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(state.session.snapshot().into())
}

/// POST /api/v1/session/probe
///
/// Manual connection re-check. Always succeeds; failures show up in the body.
pub async fn handle_probe(State(state): State<AppState>) -> Json<ProbeResponse> {
    let status = state.session.probe_connection().await;
    Json(ProbeResponse {
        status,
        endpoint: state.backend_endpoint.clone(),
    })
}

/// POST /api/v1/auth/login
pub async fn handle_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionView>, AppError> {
    state
        .session
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(state.session.snapshot().into()))
}

/// POST /api/v1/auth/register
///
/// 201 with the user when signed in; 202 when the email must be confirmed first.
pub async fn handle_register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterOutcome>), AppError> {
    let outcome = state
        .session
        .register(&request.email, &request.password, request.profile)
        .await?;
    let status = match outcome {
        RegisterOutcome::SignedIn { .. } => StatusCode::CREATED,
        RegisterOutcome::ConfirmationRequired { .. } => StatusCode::ACCEPTED,
    };
    Ok((status, Json(outcome)))
}

/// POST /api/v1/auth/logout
pub async fn handle_logout(
    State(state): State<AppState>,
) -> Result<Json<LogoutOutcome>, AppError> {
    Ok(Json(state.session.logout().await?))
}

/// POST /api/v1/auth/switch-role
pub async fn handle_switch_role(State(state): State<AppState>) -> Result<Json<User>, AppError> {
    Ok(Json(state.session.switch_role().await?))
}

/// POST /api/v1/auth/password
pub async fn handle_change_password(
    State(state): State<AppState>,
    Json(request): Json<PasswordRequest>,
) -> Result<StatusCode, AppError> {
    state
        .session
        .change_password(&request.new_password, &request.confirm_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/v1/profile
///
/// The session shows the new profile even when this returns PERSISTENCE_FAILED.
pub async fn handle_update_profile(
    State(state): State<AppState>,
    Json(user): Json<User>,
) -> Result<Json<User>, AppError> {
    Ok(Json(state.session.update_profile(user).await?))
}

/// GET /api/v1/setup/script
pub async fn handle_setup_script() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/sql; charset=utf-8")],
        SETUP_SQL,
    )
}
