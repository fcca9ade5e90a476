use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::job::{Application, Job, JobDraft, JobFilter};
use crate::models::user::{User, UserRole};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct JobIdsQuery {
    /// Comma-separated job ids.
    pub job_ids: String,
}

pub(crate) fn current_user_with_role(state: &AppState, role: UserRole) -> Result<User, AppError> {
    let user = state
        .session
        .snapshot()
        .current_user
        .ok_or(AppError::Unauthorized)?;
    if user.role != role {
        return Err(AppError::Forbidden(format!(
            "only {role:?} accounts can do this"
        )));
    }
    Ok(user)
}

/// GET /api/v1/jobs?q=&type=&area=&model=&location=
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Json<Vec<Job>> {
    Json(state.jobs.list_active_jobs(&filter).await)
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    state
        .jobs
        .get_job(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))
}

/// POST /api/v1/jobs
pub async fn handle_create_job(
    State(state): State<AppState>,
    Json(draft): Json<JobDraft>,
) -> Result<(StatusCode, Json<Job>), AppError> {
    let company = current_user_with_role(&state, UserRole::Company)?;
    if draft.title.trim().is_empty() {
        return Err(AppError::Validation("title cannot be empty".to_string()));
    }
    if let (Some(min), Some(max)) = (draft.salary_min, draft.salary_max) {
        if min > max {
            return Err(AppError::Validation(
                "salaryMin cannot exceed salaryMax".to_string(),
            ));
        }
    }

    let company_name = company
        .company
        .as_ref()
        .and_then(|c| c.company_name.clone())
        .unwrap_or_else(|| company.name.clone());
    let job = state
        .jobs
        .create_job(&company.id, &company_name, &draft)
        .await;
    Ok((StatusCode::CREATED, Json(job)))
}

/// POST /api/v1/jobs/:id/apply
pub async fn handle_apply(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let candidate = current_user_with_role(&state, UserRole::Candidate)?;
    let job = state
        .jobs
        .get_job(&job_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Job {job_id} not found")))?;
    if state.jobs.has_applied(&job_id, &candidate.id).await {
        return Err(AppError::Conflict("already applied to this job".to_string()));
    }
    let id = state.jobs.apply(&job, &candidate).await;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// GET /api/v1/jobs/:id/applied
pub async fn handle_has_applied(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let candidate = current_user_with_role(&state, UserRole::Candidate)?;
    let applied = state.jobs.has_applied(&job_id, &candidate.id).await;
    Ok(Json(json!({ "applied": applied })))
}

/// GET /api/v1/companies/:id/jobs
pub async fn handle_company_jobs(
    State(state): State<AppState>,
    Path(company_id): Path<String>,
) -> Json<Vec<Job>> {
    Json(state.jobs.company_jobs(&company_id).await)
}

/// GET /api/v1/candidates/:id/applications
pub async fn handle_candidate_applications(
    State(state): State<AppState>,
    Path(candidate_id): Path<String>,
) -> Json<Vec<Application>> {
    Json(state.jobs.candidate_applications(&candidate_id).await)
}

/// GET /api/v1/applications?job_ids=a,b
pub async fn handle_job_applications(
    State(state): State<AppState>,
    Query(params): Query<JobIdsQuery>,
) -> Json<Vec<Application>> {
    let ids: Vec<String> = params
        .job_ids
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    Json(state.jobs.job_applications(&ids).await)
}
