use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::backend::fallback::FallbackDataset;
use crate::backend::supabase::SupabaseClient;
use crate::backend::BackendError;
use crate::models::job::{
    Application, ApplicationRow, ApplicationStatus, Job, JobDraft, JobFilter, JobRow, JobStatus,
    NewApplicationRow, NewJobRow,
};
use crate::models::user::User;
use crate::session::SessionStore;

const JOBS: &str = "jobs";
const APPLICATIONS: &str = "applications";
const JOB_WITH_COMPANY: &str = "*,profiles(company_name,name)";

fn degraded(context: &str, e: &BackendError) {
    if e.is_schema_missing() {
        warn!("{context}: tables missing, serving fallback data");
    } else {
        error!("{context} failed, serving fallback data: {e}");
    }
}

fn newest_jobs_first(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| b.posted_at.cmp(&a.posted_at));
    jobs
}

fn newest_applications_first(mut apps: Vec<Application>) -> Vec<Application> {
    apps.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
    apps
}

/// The stored label of an enum value, e.g. `"Híbrido"` for `WorkModel::Hybrid`.
fn label<T: Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

/// PostgREST `in.(...)` list with every id double-quoted, so `,` and `)`
/// inside an id stay part of the value.
fn in_list(ids: &[String]) -> String {
    let quoted: Vec<String> = ids
        .iter()
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Jobs and applications, read from the backend when LIVE and from the demo
/// copy of the seed dataset otherwise. Demo writes stay in memory.
pub struct JobBoard {
    client: Arc<SupabaseClient>,
    demo_jobs: RwLock<Vec<Job>>,
    demo_applications: RwLock<Vec<Application>>,
    session: SessionStore,
}

impl JobBoard {
    pub fn new(
        client: Arc<SupabaseClient>,
        dataset: Arc<FallbackDataset>,
        session: SessionStore,
    ) -> Self {
        Self {
            client,
            demo_jobs: RwLock::new(dataset.jobs.clone()),
            demo_applications: RwLock::new(dataset.applications.clone()),
            session,
        }
    }

    fn is_live(&self) -> bool {
        self.session.snapshot().mode.is_live()
    }

    /// Runs `query` against the backend when LIVE; otherwise, or on error, `fallback`.
    async fn live_or<T, Q, F>(&self, context: &str, query: Q, fallback: F) -> T
    where
        Q: Future<Output = Result<T, BackendError>>,
        F: Future<Output = T>,
    {
        if !self.is_live() {
            return fallback.await;
        }
        match query.await {
            Ok(value) => value,
            Err(e) => {
                degraded(context, &e);
                fallback.await
            }
        }
    }

    /// Moderation writes: a LIVE failure is returned, never replaced by a demo edit.
    async fn live_else<T, Q, F>(&self, query: Q, demo: F) -> Result<T, BackendError>
    where
        Q: Future<Output = Result<T, BackendError>>,
        F: Future<Output = T>,
    {
        if self.is_live() {
            query.await
        } else {
            Ok(demo.await)
        }
    }

    pub async fn list_active_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        let query = async {
            let mut params = vec![
                ("select", JOB_WITH_COMPANY.to_string()),
                ("status", "eq.ACTIVE".to_string()),
                ("order", "posted_at.desc".to_string()),
            ];
            if let Some(job_type) = filter.job_type {
                params.push(("type", format!("eq.{}", label(&job_type))));
            }
            if let Some(area) = filter.area {
                params.push(("area", format!("eq.{}", label(&area))));
            }
            if let Some(model) = filter.model {
                params.push(("model", format!("eq.{}", label(&model))));
            }
            let rows: Vec<JobRow> = self.client.select(JOBS, &params).await?;
            Ok::<_, BackendError>(rows.into_iter().map(Job::from).collect())
        };
        let fallback = async {
            newest_jobs_first(
                self.demo_jobs
                    .read()
                    .await
                    .iter()
                    .filter(|j| j.status == JobStatus::Active)
                    .cloned()
                    .collect(),
            )
        };
        let mut jobs: Vec<Job> = self.live_or("list_active_jobs", query, fallback).await;
        // Title/company search spans the embedded profile, so it is applied here.
        jobs.retain(|job| filter.matches(job));
        jobs
    }

    /// Every job regardless of status, for moderation.
    pub async fn all_jobs(&self) -> Vec<Job> {
        let query = async {
            let rows: Vec<JobRow> = self
                .client
                .select(
                    JOBS,
                    &[
                        ("select", JOB_WITH_COMPANY.to_string()),
                        ("order", "posted_at.desc".to_string()),
                    ],
                )
                .await?;
            Ok::<_, BackendError>(rows.into_iter().map(Job::from).collect())
        };
        let fallback = async { newest_jobs_first(self.demo_jobs.read().await.clone()) };
        self.live_or("all_jobs", query, fallback).await
    }

    pub async fn get_job(&self, id: &str) -> Option<Job> {
        let query = async {
            let rows: Vec<JobRow> = self
                .client
                .select(
                    JOBS,
                    &[
                        ("select", JOB_WITH_COMPANY.to_string()),
                        ("id", format!("eq.{id}")),
                    ],
                )
                .await?;
            Ok::<_, BackendError>(rows.into_iter().next().map(Job::from))
        };
        let fallback = async {
            self.demo_jobs
                .read()
                .await
                .iter()
                .find(|j| j.id == id)
                .cloned()
        };
        self.live_or("get_job", query, fallback).await
    }

    pub async fn company_jobs(&self, company_id: &str) -> Vec<Job> {
        let query = async {
            let rows: Vec<JobRow> = self
                .client
                .select(
                    JOBS,
                    &[
                        ("select", JOB_WITH_COMPANY.to_string()),
                        ("company_id", format!("eq.{company_id}")),
                        ("order", "posted_at.desc".to_string()),
                    ],
                )
                .await?;
            Ok::<_, BackendError>(rows.into_iter().map(Job::from).collect())
        };
        let fallback = async {
            newest_jobs_first(
                self.demo_jobs
                    .read()
                    .await
                    .iter()
                    .filter(|j| j.company_id == company_id)
                    .cloned()
                    .collect(),
            )
        };
        self.live_or("company_jobs", query, fallback).await
    }

    /// Posts a job; when the backend cannot store it a local copy with a `mock-id-` id is kept.
    pub async fn create_job(&self, company_id: &str, company_name: &str, draft: &JobDraft) -> Job {
        let query = async {
            let row: JobRow = self
                .client
                .insert(JOBS, &NewJobRow::from_draft(company_id, draft))
                .await?;
            Ok::<_, BackendError>(Job::from(row))
        };
        let fallback = async {
            let job = Job {
                id: format!("mock-id-{}", Utc::now().timestamp_millis()),
                company_id: company_id.to_string(),
                company_name: company_name.to_string(),
                title: draft.title.clone(),
                description: draft.description.clone(),
                requirements: draft.requirements.clone(),
                location: draft.location.clone(),
                address: draft.address.clone(),
                job_type: draft.job_type,
                model: draft.model,
                area: draft.area,
                salary_min: draft.salary_min,
                salary_max: draft.salary_max,
                posted_at: Utc::now(),
                status: JobStatus::Active,
            };
            self.demo_jobs.write().await.push(job.clone());
            job
        };
        let mut job = self.live_or("create_job", query, fallback).await;
        job.company_name = company_name.to_string();
        job
    }

    /// Returns the new application's id.
    pub async fn apply(&self, job: &Job, candidate: &User) -> String {
        let query = async {
            let row: ApplicationRow = self
                .client
                .insert(
                    APPLICATIONS,
                    &NewApplicationRow {
                        job_id: &job.id,
                        candidate_id: &candidate.id,
                        status: ApplicationStatus::Applied,
                    },
                )
                .await?;
            Ok::<_, BackendError>(row.id)
        };
        let fallback = async {
            let id = format!("mock-app-{}", Utc::now().timestamp_millis());
            self.demo_applications.write().await.push(Application {
                id: id.clone(),
                job_id: job.id.clone(),
                candidate_id: candidate.id.clone(),
                candidate_name: candidate.name.clone(),
                status: ApplicationStatus::Applied,
                applied_at: Utc::now(),
                job_title: job.title.clone(),
                company_name: job.company_name.clone(),
            });
            id
        };
        self.live_or("apply", query, fallback).await
    }

    pub async fn has_applied(&self, job_id: &str, candidate_id: &str) -> bool {
        let query = async {
            let rows: Vec<serde_json::Value> = self
                .client
                .select(
                    APPLICATIONS,
                    &[
                        ("select", "id".to_string()),
                        ("job_id", format!("eq.{job_id}")),
                        ("candidate_id", format!("eq.{candidate_id}")),
                        ("limit", "1".to_string()),
                    ],
                )
                .await?;
            Ok::<_, BackendError>(!rows.is_empty())
        };
        let fallback = async {
            self.demo_applications
                .read()
                .await
                .iter()
                .any(|a| a.job_id == job_id && a.candidate_id == candidate_id)
        };
        self.live_or("has_applied", query, fallback).await
    }

    pub async fn candidate_applications(&self, candidate_id: &str) -> Vec<Application> {
        let query = async {
            let rows: Vec<ApplicationRow> = self
                .client
                .select(
                    APPLICATIONS,
                    &[
                        ("select", "*,jobs(title,profiles(company_name))".to_string()),
                        ("candidate_id", format!("eq.{candidate_id}")),
                        ("order", "applied_at.desc".to_string()),
                    ],
                )
                .await?;
            Ok::<_, BackendError>(rows.into_iter().map(Application::from).collect())
        };
        let fallback = async {
            newest_applications_first(
                self.demo_applications
                    .read()
                    .await
                    .iter()
                    .filter(|a| a.candidate_id == candidate_id)
                    .cloned()
                    .collect(),
            )
        };
        self.live_or("candidate_applications", query, fallback).await
    }

    pub async fn job_applications(&self, job_ids: &[String]) -> Vec<Application> {
        if job_ids.is_empty() {
            return Vec::new();
        }
        let query = async {
            let rows: Vec<ApplicationRow> = self
                .client
                .select(
                    APPLICATIONS,
                    &[
                        ("select", "*,profiles(name)".to_string()),
                        ("job_id", in_list(job_ids)),
                        ("order", "applied_at.desc".to_string()),
                    ],
                )
                .await?;
            Ok::<_, BackendError>(rows.into_iter().map(Application::from).collect())
        };
        let fallback = async {
            newest_applications_first(
                self.demo_applications
                    .read()
                    .await
                    .iter()
                    .filter(|a| job_ids.contains(&a.job_id))
                    .cloned()
                    .collect(),
            )
        };
        self.live_or("job_applications", query, fallback).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Moderation
    // ────────────────────────────────────────────────────────────────────────

    /// Marks a job CLOSED. `None` when the job does not exist.
    pub async fn close_job(&self, id: &str) -> Result<Option<Job>, BackendError> {
        let query = async {
            let rows: Vec<JobRow> = self
                .client
                .update_returning(
                    JOBS,
                    &[
                        ("id", format!("eq.{id}")),
                        ("select", JOB_WITH_COMPANY.to_string()),
                    ],
                    &json!({ "status": JobStatus::Closed }),
                )
                .await?;
            Ok::<_, BackendError>(rows.into_iter().next().map(Job::from))
        };
        let demo = async {
            let mut jobs = self.demo_jobs.write().await;
            jobs.iter_mut().find(|j| j.id == id).map(|job| {
                job.status = JobStatus::Closed;
                job.clone()
            })
        };
        let closed = self.live_else(query, demo).await?;
        if closed.is_some() {
            info!("Closed job {id}");
        }
        Ok(closed)
    }

    /// Deletes a job and its applications. `false` when the job does not exist.
    pub async fn delete_job(&self, id: &str) -> Result<bool, BackendError> {
        let query = async {
            let removed = self.client.delete(JOBS, &[("id", format!("eq.{id}"))]).await?;
            Ok::<_, BackendError>(removed > 0)
        };
        let demo = async {
            let mut jobs = self.demo_jobs.write().await;
            let before = jobs.len();
            jobs.retain(|j| j.id != id);
            let removed = jobs.len() < before;
            drop(jobs);
            if removed {
                self.demo_applications
                    .write()
                    .await
                    .retain(|a| a.job_id != id);
            }
            removed
        };
        let removed = self.live_else(query, demo).await?;
        if removed {
            info!("Deleted job {id}");
        }
        Ok(removed)
    }
}
