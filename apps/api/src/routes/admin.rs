//! Moderation endpoints. Every handler requires an ADMIN current user.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::errors::AppError;
use crate::jobs::handlers::current_user_with_role;
use crate::models::job::Job;
use crate::models::user::{User, UserFilter, UserRole};
use crate::state::AppState;

/// GET /api/v1/admin/users?q=&role=
pub async fn handle_list_users(
    State(state): State<AppState>,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<User>>, AppError> {
    current_user_with_role(&state, UserRole::Admin)?;
    Ok(Json(state.session.list_users(&filter).await?))
}

/// DELETE /api/v1/admin/users/:id
pub async fn handle_delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    current_user_with_role(&state, UserRole::Admin)?;
    if !state.session.delete_user(&id).await? {
        return Err(AppError::NotFound(format!("User {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/jobs
pub async fn handle_list_all_jobs(
    State(state): State<AppState>,
) -> Result<Json<Vec<Job>>, AppError> {
    current_user_with_role(&state, UserRole::Admin)?;
    Ok(Json(state.jobs.all_jobs().await))
}

/// POST /api/v1/admin/jobs/:id/close
pub async fn handle_close_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    current_user_with_role(&state, UserRole::Admin)?;
    state
        .jobs
        .close_job(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

/// DELETE /api/v1/admin/jobs/:id
pub async fn handle_delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    current_user_with_role(&state, UserRole::Admin)?;
    if !state.jobs.delete_job(&id).await? {
        return Err(AppError::NotFound(format!("Job {id} not found")));
    }
    Ok(StatusCode::NO_CONTENT)
}
