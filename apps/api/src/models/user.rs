use serde::{Deserialize, Serialize};

use crate::models::job::{JobArea, JobType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Candidate,
    Company,
    Admin,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyProfile {
    pub company_name: Option<String>,
    pub company_area: Option<JobArea>,
    pub company_website: Option<String>,
    pub company_logo: Option<String>,
    pub company_description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateProfile {
    pub resume_url: Option<String>,
    pub resume_name: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub experience: Option<String>,
    pub education: Option<String>,
    pub area_of_interest: Option<JobArea>,
    pub availability: Option<JobType>,
}

/// An authenticated person as the UI sees them.
///
/// At most one of `company` / `candidate` is populated, matching `role`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<CompanyProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<CandidateProfile>,
}

impl User {
    /// Minimal user for an auth identity whose profile row is missing or unreadable.
    pub fn placeholder(id: &str, email: &str) -> Self {
        let name = email.split('@').next().unwrap_or_default().to_string();
        User {
            id: id.to_string(),
            email: email.to_string(),
            name,
            role: UserRole::Candidate,
            avatar: None,
            location: None,
            company: None,
            candidate: Some(CandidateProfile::default()),
        }
    }

    pub fn from_registration(id: &str, email: &str, attrs: NewProfile) -> Self {
        User {
            id: id.to_string(),
            email: email.to_string(),
            name: attrs.name,
            role: attrs.role,
            avatar: attrs.avatar,
            location: attrs.location,
            company: attrs.company,
            candidate: attrs.candidate,
        }
        .normalized()
    }

    /// Drops the attribute set that does not apply to `role`.
    pub fn normalized(mut self) -> Self {
        match self.role {
            UserRole::Company => {
                self.candidate = None;
                self.company.get_or_insert_with(CompanyProfile::default);
            }
            UserRole::Candidate => {
                self.company = None;
                self.candidate.get_or_insert_with(CandidateProfile::default);
            }
            UserRole::Admin => {
                self.company = None;
                self.candidate = None;
            }
        }
        self
    }
}

/// Attributes supplied at registration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub name: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub location: Option<String>,
    pub company: Option<CompanyProfile>,
    pub candidate: Option<CandidateProfile>,
}

/// Moderation search over users.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserFilter {
    /// Case-insensitive match on name or email.
    pub q: Option<String>,
    pub role: Option<UserRole>,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        let search = match self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => {
                let q = q.to_lowercase();
                user.name.to_lowercase().contains(&q) || user.email.to_lowercase().contains(&q)
            }
            None => true,
        };
        search && self.role.map_or(true, |role| user.role == role)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// `profiles` table row
// ────────────────────────────────────────────────────────────────────────────

/// One row of the `profiles` table. The non-applicable attribute set is null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub email: Option<String>,
    pub role: UserRole,
    pub name: String,
    pub avatar: Option<String>,
    pub location: Option<String>,

    pub company_name: Option<String>,
    pub company_area: Option<JobArea>,
    pub company_website: Option<String>,
    pub company_logo: Option<String>,
    pub company_description: Option<String>,

    pub resume_url: Option<String>,
    pub resume_name: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience: Option<String>,
    pub education: Option<String>,
    pub area_of_interest: Option<JobArea>,
    pub availability: Option<JobType>,
}

impl ProfileRow {
    /// Maps the row to a `User`, preferring the row's email over the auth identity's.
    pub fn into_user(self, auth_email: Option<&str>) -> User {
        let email = self
            .email
            .filter(|e| !e.is_empty())
            .or_else(|| auth_email.map(str::to_string))
            .unwrap_or_default();

        let company = CompanyProfile {
            company_name: self.company_name,
            company_area: self.company_area,
            company_website: self.company_website,
            company_logo: self.company_logo,
            company_description: self.company_description,
        };
        let candidate = CandidateProfile {
            resume_url: self.resume_url,
            resume_name: self.resume_name,
            skills: self.skills.unwrap_or_default(),
            experience: self.experience,
            education: self.education,
            area_of_interest: self.area_of_interest,
            availability: self.availability,
        };

        User {
            id: self.id,
            email,
            name: self.name,
            role: self.role,
            avatar: self.avatar,
            location: self.location,
            company: Some(company),
            candidate: Some(candidate),
        }
        .normalized()
    }
}

impl From<&User> for ProfileRow {
    fn from(user: &User) -> Self {
        let user = user.clone().normalized();
        let company = user.company.unwrap_or_default();
        let candidate = user.candidate;
        let skills = candidate.as_ref().map(|c| c.skills.clone());
        let candidate = candidate.unwrap_or_default();

        ProfileRow {
            id: user.id,
            email: Some(user.email),
            role: user.role,
            name: user.name,
            avatar: user.avatar,
            location: user.location,
            company_name: company.company_name,
            company_area: company.company_area,
            company_website: company.company_website,
            company_logo: company.company_logo,
            company_description: company.company_description,
            resume_url: candidate.resume_url,
            resume_name: candidate.resume_name,
            skills,
            experience: candidate.experience,
            education: candidate.education,
            area_of_interest: candidate.area_of_interest,
            availability: candidate.availability,
        }
    }
}

/// PATCH payload for `profiles`. Never carries `id`, `email` or `role`.
#[derive(Debug, Serialize)]
pub struct ProfileUpdate {
    pub name: String,
    pub avatar: Option<String>,
    pub location: Option<String>,

    pub company_name: Option<String>,
    pub company_area: Option<JobArea>,
    pub company_website: Option<String>,
    pub company_logo: Option<String>,
    pub company_description: Option<String>,

    pub resume_url: Option<String>,
    pub resume_name: Option<String>,
    pub skills: Option<Vec<String>>,
    pub experience: Option<String>,
    pub education: Option<String>,
    pub area_of_interest: Option<JobArea>,
    pub availability: Option<JobType>,
}

impl From<&User> for ProfileUpdate {
    fn from(user: &User) -> Self {
        let row = ProfileRow::from(user);
        ProfileUpdate {
            name: row.name,
            avatar: row.avatar,
            location: row.location,
            company_name: row.company_name,
            company_area: row.company_area,
            company_website: row.company_website,
            company_logo: row.company_logo,
            company_description: row.company_description,
            resume_url: row.resume_url,
            resume_name: row.resume_name,
            skills: row.skills,
            experience: row.experience,
            education: row.education,
            area_of_interest: row.area_of_interest,
            availability: row.availability,
        }
    }
}
