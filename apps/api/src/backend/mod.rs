//! Backend capability interface.
//!
//! The session controller talks to whichever implementation matches the
//! current connection mode: `SupabaseClient` when LIVE, `FallbackBackend`
//! otherwise. Both satisfy `AuthBackend`; only the live client can be probed.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::user::{NewProfile, User};

pub mod fallback;
pub mod supabase;

/// Postgres / PostgREST codes meaning "relation does not exist".
const SCHEMA_MISSING_CODES: [&str; 2] = ["PGRST205", "42P01"];

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("schema missing: {0}")]
    SchemaMissing(String),

    #[error("invalid login credentials")]
    InvalidCredentials,

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("query error ({code}): {message}")]
    Query { code: String, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Unsupported(String),
}

impl BackendError {
    /// Classifies an error body returned by the table API.
    pub fn from_query(code: Option<String>, message: String) -> Self {
        match code {
            Some(code) if SCHEMA_MISSING_CODES.contains(&code.as_str()) => {
                BackendError::SchemaMissing(message)
            }
            Some(code) => BackendError::Query { code, message },
            None => BackendError::Query {
                code: "unknown".to_string(),
                message,
            },
        }
    }

    pub fn is_schema_missing(&self) -> bool {
        matches!(self, BackendError::SchemaMissing(_))
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            BackendError::Decode(e.to_string())
        } else {
            BackendError::Network(e.to_string())
        }
    }
}

/// The bare authentication identity behind a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthIdentity {
    pub user_id: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct SignUp {
    pub identity: AuthIdentity,
    /// False when the backend wants the address confirmed before issuing a session.
    pub session_issued: bool,
}

#[derive(Debug, Clone)]
pub enum SignOut {
    /// The backend session was invalidated.
    Ended,
    /// No real session exists; the UI is reset to this user instead.
    Reset(User),
}

/// Auth-state changes pushed by a backend independently of explicit calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(AuthIdentity),
    TokenRefreshed(AuthIdentity),
    SignedOut,
}

/// Minimal reachability and schema check.
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    async fn probe(&self) -> Result<(), BackendError>;
}

/// Everything the session controller needs from a backend.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn current_session(&self) -> Result<Option<AuthIdentity>, BackendError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &NewProfile,
    ) -> Result<SignUp, BackendError>;

    async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<User, BackendError>;

    async fn insert_profile(&self, user: &User) -> Result<User, BackendError>;

    async fn update_profile(&self, user: &User) -> Result<(), BackendError>;

    /// Every profile, for moderation.
    async fn list_profiles(&self) -> Result<Vec<User>, BackendError>;

    /// Removes a profile; `false` when there was none with this id.
    async fn delete_profile(&self, id: &str) -> Result<bool, BackendError>;

    async fn update_password(&self, new_password: &str) -> Result<(), BackendError>;

    async fn sign_out(&self) -> Result<SignOut, BackendError>;

    /// Swaps the current user for one with a different role, where supported.
    async fn switch_role(&self, current: Option<&User>) -> Result<User, BackendError>;

    /// Auth-state events, if this backend produces any.
    fn subscribe(&self) -> Option<broadcast::Receiver<AuthEvent>>;
}
