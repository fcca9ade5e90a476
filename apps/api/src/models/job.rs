use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Contract type. Serialized with the labels stored in the `job_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobType {
    #[serde(rename = "CLT")]
    FullTime,
    #[serde(rename = "PJ")]
    Contract,
    #[serde(rename = "Freelancer")]
    Freelance,
    #[serde(rename = "Estágio")]
    Internship,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkModel {
    #[serde(rename = "Presencial")]
    Onsite,
    #[serde(rename = "Remoto")]
    Remote,
    #[serde(rename = "Híbrido")]
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobArea {
    #[serde(rename = "Tecnologia")]
    Tech,
    #[serde(rename = "Marketing")]
    Marketing,
    #[serde(rename = "Design")]
    Design,
    #[serde(rename = "Vendas")]
    Sales,
    #[serde(rename = "Financeiro")]
    Finance,
    #[serde(rename = "Recursos Humanos")]
    HumanResources,
    #[serde(rename = "Saúde")]
    Health,
    #[serde(rename = "Educação")]
    Education,
    #[serde(rename = "Operações")]
    Operations,
    #[serde(rename = "Outros")]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Active,
    Paused,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApplicationStatus {
    #[default]
    #[serde(rename = "Enviado")]
    Applied,
    #[serde(rename = "Em análise")]
    Reviewing,
    #[serde(rename = "Aprovado")]
    Approved,
    #[serde(rename = "Rejeitado")]
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAddress {
    pub cep: String,
    pub street: String,
    pub number: String,
    #[serde(default)]
    pub complement: String,
}

/// A job posting as exposed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub company_id: String,
    pub company_name: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub location: String,
    pub address: Option<JobAddress>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub model: WorkModel,
    pub area: JobArea,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub posted_at: DateTime<Utc>,
    pub status: JobStatus,
}

/// Fields a company submits when posting a job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub location: String,
    pub address: Option<JobAddress>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub model: WorkModel,
    pub area: JobArea,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub job_id: String,
    pub candidate_id: String,
    pub candidate_name: String,
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub job_title: String,
    pub company_name: String,
}

/// `GET /api/v1/jobs` filters. Absent fields match everything; text is
/// compared as a case-insensitive substring.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    /// Matches the title or the company name.
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<JobType>,
    pub area: Option<JobArea>,
    pub model: Option<WorkModel>,
    pub location: Option<String>,
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn text_term(term: &Option<String>) -> Option<&str> {
    term.as_deref().map(str::trim).filter(|t| !t.is_empty())
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        let search = text_term(&self.q)
            .map_or(true, |q| contains_ci(&job.title, q) || contains_ci(&job.company_name, q));
        let location = text_term(&self.location).map_or(true, |l| contains_ci(&job.location, l));
        search
            && location
            && self.job_type.map_or(true, |t| job.job_type == t)
            && self.area.map_or(true, |a| job.area == a)
            && self.model.map_or(true, |m| job.model == m)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Row shapes of the `jobs` and `applications` tables
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyRef {
    pub company_name: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobRow {
    pub id: String,
    pub company_id: String,
    pub title: String,
    pub description: String,
    pub requirements: Option<Vec<String>>,
    pub location: String,
    pub address: Option<JobAddress>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub model: WorkModel,
    pub area: JobArea,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub posted_at: DateTime<Utc>,
    #[serde(default)]
    pub status: JobStatus,
    pub profiles: Option<CompanyRef>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        let company = row.profiles.unwrap_or_default();
        Job {
            id: row.id,
            company_id: row.company_id,
            company_name: company
                .company_name
                .or(company.name)
                .unwrap_or_else(|| "Confidential company".to_string()),
            title: row.title,
            description: row.description,
            requirements: row.requirements.unwrap_or_default(),
            location: row.location,
            address: row.address,
            job_type: row.job_type,
            model: row.model,
            area: row.area,
            salary_min: row.salary_min,
            salary_max: row.salary_max,
            posted_at: row.posted_at,
            status: row.status,
        }
    }
}

/// Insert payload for `jobs`; `posted_at` and `id` are filled by the database.
#[derive(Debug, Serialize)]
pub struct NewJobRow<'a> {
    pub company_id: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub requirements: &'a [String],
    pub location: &'a str,
    pub address: Option<&'a JobAddress>,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub model: WorkModel,
    pub area: JobArea,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub status: JobStatus,
}

impl<'a> NewJobRow<'a> {
    pub fn from_draft(company_id: &'a str, draft: &'a JobDraft) -> Self {
        Self {
            company_id,
            title: &draft.title,
            description: &draft.description,
            requirements: &draft.requirements,
            location: &draft.location,
            address: draft.address.as_ref(),
            job_type: draft.job_type,
            model: draft.model,
            area: draft.area,
            salary_min: draft.salary_min,
            salary_max: draft.salary_max,
            status: JobStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CandidateRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRef {
    pub title: Option<String>,
    pub profiles: Option<CompanyRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationRow {
    pub id: String,
    pub job_id: String,
    pub candidate_id: String,
    #[serde(default)]
    pub status: ApplicationStatus,
    pub applied_at: DateTime<Utc>,
    pub profiles: Option<CandidateRef>,
    pub jobs: Option<JobRef>,
}

impl From<ApplicationRow> for Application {
    fn from(row: ApplicationRow) -> Self {
        let job = row.jobs.unwrap_or_default();
        Application {
            id: row.id,
            job_id: row.job_id,
            candidate_id: row.candidate_id,
            candidate_name: row
                .profiles
                .and_then(|p| p.name)
                .unwrap_or_else(|| "Candidate".to_string()),
            status: row.status,
            applied_at: row.applied_at,
            job_title: job.title.unwrap_or_else(|| "Job unavailable".to_string()),
            company_name: job
                .profiles
                .and_then(|p| p.company_name)
                .unwrap_or_else(|| "Company".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NewApplicationRow<'a> {
    pub job_id: &'a str,
    pub candidate_id: &'a str,
    pub status: ApplicationStatus,
}
