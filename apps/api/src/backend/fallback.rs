//! Demo-mode backend over the static fallback dataset.

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::{AuthBackend, AuthEvent, AuthIdentity, BackendError, SignOut, SignUp};
use crate::models::job::{Application, Job};
use crate::models::user::{NewProfile, User, UserRole};

const SEED_JSON: &str = include_str!("../../seed/fallback.json");

/// Seed users, jobs and applications used whenever the backend is not authoritative.
/// Entry 0 of `users` is a candidate, entry 1 a company.
#[derive(Debug, Clone, Deserialize)]
pub struct FallbackDataset {
    pub users: Vec<User>,
    pub jobs: Vec<Job>,
    pub applications: Vec<Application>,
}

impl FallbackDataset {
    pub fn load() -> Result<Self> {
        Self::from_json(SEED_JSON)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let dataset: FallbackDataset =
            serde_json::from_str(raw).context("fallback dataset is not valid JSON")?;
        ensure!(
            dataset.users.iter().any(|u| u.role == UserRole::Candidate),
            "fallback dataset needs a candidate user"
        );
        ensure!(
            dataset.users.iter().any(|u| u.role == UserRole::Company),
            "fallback dataset needs a company user"
        );
        Ok(dataset)
    }
}

pub struct FallbackBackend {
    users: RwLock<Vec<User>>,
}

impl FallbackBackend {
    pub fn new(dataset: &FallbackDataset) -> Self {
        Self {
            users: RwLock::new(dataset.users.clone()),
        }
    }

    async fn first(&self) -> Result<User, BackendError> {
        self.users
            .read()
            .await
            .first()
            .cloned()
            .ok_or_else(|| BackendError::Decode("fallback dataset has no users".to_string()))
    }

    async fn first_with_role(&self, role: UserRole) -> Result<User, BackendError> {
        self.users
            .read()
            .await
            .iter()
            .find(|u| u.role == role)
            .cloned()
            .ok_or_else(|| BackendError::Decode(format!("fallback dataset has no {role:?} user")))
    }
}

fn identity_of(user: &User) -> AuthIdentity {
    AuthIdentity {
        user_id: user.id.clone(),
        email: user.email.clone(),
    }
}

#[async_trait]
impl AuthBackend for FallbackBackend {
    async fn current_session(&self) -> Result<Option<AuthIdentity>, BackendError> {
        Ok(Some(identity_of(&self.first().await?)))
    }

    /// Any password is accepted; unknown emails resolve to entry 0.
    async fn sign_in(&self, email: &str, _password: &str) -> Result<AuthIdentity, BackendError> {
        let found = self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(identity_of);

        match found {
            Some(identity) => Ok(identity),
            None => {
                debug!("No demo user for {email}, using the first seed user");
                Ok(identity_of(&self.first().await?))
            }
        }
    }

    async fn sign_up(
        &self,
        email: &str,
        _password: &str,
        _profile: &NewProfile,
    ) -> Result<SignUp, BackendError> {
        Ok(SignUp {
            identity: AuthIdentity {
                user_id: Uuid::new_v4().to_string(),
                email: email.to_string(),
            },
            session_issued: true,
        })
    }

    async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<User, BackendError> {
        match self
            .users
            .read()
            .await
            .iter()
            .find(|u| u.id == identity.user_id)
        {
            Some(user) => Ok(user.clone()),
            None => Err(BackendError::Query {
                code: "PGRST116".to_string(),
                message: format!("no demo profile for {}", identity.user_id),
            }),
        }
    }

    async fn insert_profile(&self, user: &User) -> Result<User, BackendError> {
        let user = user.clone().normalized();
        self.users.write().await.push(user.clone());
        Ok(user)
    }

    async fn update_profile(&self, user: &User) -> Result<(), BackendError> {
        let mut users = self.users.write().await;
        if let Some(existing) = users.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        }
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<User>, BackendError> {
        Ok(self.users.read().await.clone())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool, BackendError> {
        let mut users = self.users.write().await;
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }

    async fn update_password(&self, _new_password: &str) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(
            "password changes need a connected backend".to_string(),
        ))
    }

    async fn sign_out(&self) -> Result<SignOut, BackendError> {
        Ok(SignOut::Reset(self.first().await?))
    }

    async fn switch_role(&self, current: Option<&User>) -> Result<User, BackendError> {
        let target = match current.map(|u| u.role) {
            Some(UserRole::Candidate) => UserRole::Company,
            _ => UserRole::Candidate,
        };
        self.first_with_role(target).await
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AuthEvent>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> FallbackBackend {
        FallbackBackend::new(&FallbackDataset::load().unwrap())
    }

    #[test]
    fn test_seed_dataset_order() {
        let dataset = FallbackDataset::load().unwrap();
        assert_eq!(dataset.users[0].role, UserRole::Candidate);
        assert_eq!(dataset.users[1].role, UserRole::Company);
        assert_eq!(dataset.jobs.len(), 3);
    }

    #[test]
    fn test_dataset_without_company_is_rejected() {
        let raw = r#"{"users":[{"id":"c","name":"C","email":"c@x.com","role":"CANDIDATE","avatar":null,"location":null}],"jobs":[],"applications":[]}"#;
        assert!(FallbackDataset::from_json(raw).is_err());
    }

    #[tokio::test]
    async fn test_sign_in_unknown_email_resolves_to_first_user() {
        let identity = backend().sign_in("x@y.com", "anything").await.unwrap();
        assert_eq!(identity.user_id, "cand1");
    }

    #[tokio::test]
    async fn test_sign_in_matches_email_case_insensitively() {
        let identity = backend().sign_in("RH@TechNova.com", "").await.unwrap();
        assert_eq!(identity.user_id, "comp1");
    }

    #[tokio::test]
    async fn test_registered_user_can_sign_in_again() {
        let backend = backend();
        let profile: NewProfile = serde_json::from_value(serde_json::json!({
            "name": "Maria",
            "role": "CANDIDATE"
        }))
        .unwrap();
        let signup = backend.sign_up("maria@example.com", "secret1", &profile).await.unwrap();
        assert!(signup.session_issued);

        let user = User::from_registration(
            &signup.identity.user_id,
            &signup.identity.email,
            profile,
        );
        backend.insert_profile(&user).await.unwrap();

        let identity = backend.sign_in("maria@example.com", "").await.unwrap();
        assert_eq!(identity.user_id, signup.identity.user_id);
        assert_eq!(backend.fetch_profile(&identity).await.unwrap().name, "Maria");
    }

    #[tokio::test]
    async fn test_switch_role_toggles_between_seed_entries() {
        let backend = backend();
        let candidate = backend.first().await.unwrap();
        let company = backend.switch_role(Some(&candidate)).await.unwrap();
        assert_eq!(company.id, "comp1");
        let back = backend.switch_role(Some(&company)).await.unwrap();
        assert_eq!(back.id, "cand1");
    }

    #[tokio::test]
    async fn test_sign_out_resets_to_first_user() {
        match backend().sign_out().await.unwrap() {
            SignOut::Reset(user) => assert_eq!(user.id, "cand1"),
            SignOut::Ended => panic!("demo sign-out must reset, not end"),
        }
    }

    #[tokio::test]
    async fn test_password_change_is_unsupported() {
        let err = backend().update_password("newpass").await.unwrap_err();
        assert!(matches!(err, BackendError::Unsupported(_)));
    }
}
