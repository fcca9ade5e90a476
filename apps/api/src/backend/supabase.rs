//! Live backend: a Supabase-compatible auth (`/auth/v1`) and table (`/rest/v1`) client.
//!
//! The backend session (access + refresh token) lives here, in memory. It can be
//! restored at startup from a persisted refresh token and is renewed in the
//! background by `spawn_auto_refresh`, which reports changes as `AuthEvent`s.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{AuthBackend, AuthEvent, AuthIdentity, BackendError, ConnectionProbe, SignOut, SignUp};
use crate::models::user::{NewProfile, ProfileRow, ProfileUpdate, User};

const PROFILES: &str = "profiles";
/// Table read by the connectivity probe.
const PROBE_TABLE: &str = "jobs";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
/// Renew the access token this long before it expires.
const REFRESH_MARGIN_SECS: i64 = 60;
const IDLE_REFRESH_CHECK: Duration = Duration::from_secs(30);
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct StoredSession {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    identity: AuthIdentity,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

impl AuthUser {
    fn identity(self) -> AuthIdentity {
        AuthIdentity {
            user_id: self.id,
            email: self.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> StoredSession {
        StoredSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(self.expires_in),
            identity: self.user.identity(),
        }
    }
}

/// Sign-up answers with a full session, or with the bare user when the
/// address must be confirmed first.
#[derive(Debug, Deserialize)]
struct SignUpResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: Option<AuthUser>,
    id: Option<String>,
    email: Option<String>,
}

impl SignUpResponse {
    fn split(self) -> Result<(AuthIdentity, Option<StoredSession>), BackendError> {
        match (self.access_token, self.user) {
            (Some(access_token), Some(user)) => {
                let session = TokenResponse {
                    access_token,
                    refresh_token: self.refresh_token.unwrap_or_default(),
                    expires_in: self.expires_in.unwrap_or(3600),
                    user,
                }
                .into_session();
                Ok((session.identity.clone(), Some(session)))
            }
            (None, Some(user)) => Ok((user.identity(), None)),
            (None, None) => match self.id {
                Some(id) => Ok((
                    AuthIdentity {
                        user_id: id,
                        email: self.email.unwrap_or_default(),
                    },
                    None,
                )),
                None => Err(BackendError::Decode(
                    "sign-up response carried no user".to_string(),
                )),
            },
            (Some(_), None) => Err(BackendError::Decode(
                "sign-up session carried no user".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct AuthErrorBody {
    error: Option<String>,
    error_description: Option<String>,
    error_code: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl AuthErrorBody {
    fn message(&self) -> String {
        self.error_description
            .clone()
            .or_else(|| self.msg.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
            .unwrap_or_else(|| "unknown auth error".to_string())
    }

    fn is_invalid_credentials(&self) -> bool {
        self.error.as_deref() == Some("invalid_grant")
            || self.error_code.as_deref() == Some("invalid_credentials")
    }
}

#[derive(Debug, Default, Deserialize)]
struct QueryErrorBody {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Validates the configured project URL; the error text becomes the probe message.
fn parse_base_url(raw: Option<&str>) -> Result<Url, String> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "Supabase URL is not configured".to_string())?;
    if !raw.starts_with("http") {
        return Err("invalid Supabase URL".to_string());
    }
    let mut url = Url::parse(raw).map_err(|e| format!("invalid Supabase URL: {e}"))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// `https://abcd***0.supabase.co` style rendering for diagnostics.
pub fn mask_url(raw: Option<&str>) -> String {
    let Some(url) = raw.and_then(|r| Url::parse(r).ok()) else {
        return "invalid URL".to_string();
    };
    let host: Vec<char> = url.host_str().unwrap_or_default().chars().collect();
    let head: String = host.iter().take(4).collect();
    let tail: String = host[host.len().saturating_sub(10)..].iter().collect();
    format!("{}://{head}***{tail}", url.scheme())
}

pub struct SupabaseClient {
    client: Client,
    base_url: Result<Url, String>,
    raw_url: Option<String>,
    anon_key: String,
    session: RwLock<Option<StoredSession>>,
    /// Persisted refresh token, consumed by the first `current_session` call.
    restore_token: Mutex<Option<String>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseClient {
    pub fn new(
        url: Option<String>,
        anon_key: Option<String>,
        refresh_token: Option<String>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            client,
            base_url: parse_base_url(url.as_deref()),
            raw_url: url,
            anon_key: anon_key.unwrap_or_default(),
            session: RwLock::new(None),
            restore_token: Mutex::new(refresh_token.filter(|t| !t.is_empty())),
            events,
        })
    }

    pub fn masked_url(&self) -> String {
        mask_url(self.raw_url.as_deref())
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        let base = self.base_url.as_ref().map_err(|e| BackendError::Config(e.clone()))?;
        base.join(path)
            .map_err(|e| BackendError::Config(format!("bad endpoint {path}: {e}")))
    }

    async fn bearer(&self) -> String {
        match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.anon_key.clone(),
        }
    }

    async fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer().await)
    }

    fn emit(&self, event: AuthEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    // ────────────────────────────────────────────────────────────────────────
    // Table API
    // ────────────────────────────────────────────────────────────────────────

    async fn check_query(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let parsed: QueryErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed.message.unwrap_or(body);
        if status == StatusCode::UNAUTHORIZED {
            return Err(BackendError::Unauthorized(message));
        }
        Err(BackendError::from_query(
            parsed.code.or_else(|| Some(status.as_u16().to_string())),
            message,
        ))
    }

    /// Lists rows of `table` filtered by PostgREST query parameters.
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self.authorized(self.client.get(url).query(query)).await;
        let response = Self::check_query(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Fetches exactly one row; zero rows is an error (`PGRST116`).
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<T, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .authorized(self.client.get(url).query(query))
            .await
            .header("Accept", SINGLE_OBJECT);
        let response = Self::check_query(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Inserts one row and returns it as stored.
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        row: &B,
    ) -> Result<T, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .authorized(self.client.post(url).json(row))
            .await
            .header("Prefer", "return=representation")
            .header("Accept", SINGLE_OBJECT);
        let response = Self::check_query(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn update<B: Serialize + ?Sized>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        patch: &B,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .authorized(self.client.patch(url).query(filter).json(patch))
            .await
            .header("Prefer", "return=minimal");
        Self::check_query(request.send().await?).await?;
        Ok(())
    }

    /// Like `update`, but returns the changed rows.
    pub async fn update_returning<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        filter: &[(&str, String)],
        patch: &B,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .authorized(self.client.patch(url).query(filter).json(patch))
            .await
            .header("Prefer", "return=representation");
        let response = Self::check_query(request.send().await?).await?;
        Ok(response.json().await?)
    }

    /// Deletes matching rows and returns how many went away. Rows hidden by
    /// row-level security count as absent.
    pub async fn delete(
        &self,
        table: &str,
        filter: &[(&str, String)],
    ) -> Result<usize, BackendError> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let request = self
            .authorized(self.client.delete(url).query(filter))
            .await
            .header("Prefer", "return=representation");
        let response = Self::check_query(request.send().await?).await?;
        let removed: Vec<serde_json::Value> = response.json().await?;
        Ok(removed.len())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Auth API
    // ────────────────────────────────────────────────────────────────────────

    async fn check_auth(response: Response) -> Result<Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body: AuthErrorBody = response.json().await.unwrap_or_default();
        if body.is_invalid_credentials() {
            return Err(BackendError::InvalidCredentials);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BackendError::Unauthorized(body.message()));
        }
        Err(BackendError::Query {
            code: body
                .error_code
                .clone()
                .unwrap_or_else(|| status.as_u16().to_string()),
            message: body.message(),
        })
    }

    async fn token_grant<B: Serialize>(
        &self,
        grant_type: &str,
        body: &B,
    ) -> Result<StoredSession, BackendError> {
        let url = self.endpoint("auth/v1/token")?;
        let response = self
            .client
            .post(url)
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(body)
            .send()
            .await?;
        let token: TokenResponse = Self::check_auth(response).await?.json().await?;
        Ok(token.into_session())
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<AuthIdentity, BackendError> {
        let session = self
            .token_grant("refresh_token", &json!({ "refresh_token": refresh_token }))
            .await?;
        let identity = session.identity.clone();
        *self.session.write().await = Some(session);
        Ok(identity)
    }

    /// Renews the stored session if it expires within the refresh margin.
    async fn refresh_if_due(&self) -> Result<Option<AuthIdentity>, BackendError> {
        let due = {
            let session = self.session.read().await;
            match session.as_ref() {
                Some(s)
                    if s.expires_at - Utc::now()
                        <= chrono::Duration::seconds(REFRESH_MARGIN_SECS) =>
                {
                    Some(s.refresh_token.clone())
                }
                _ => None,
            }
        };
        match due {
            Some(token) => self.refresh_with(&token).await.map(Some),
            None => Ok(None),
        }
    }

    async fn until_refresh(&self) -> Duration {
        match self.session.read().await.as_ref() {
            Some(s) => (s.expires_at - Utc::now()
                - chrono::Duration::seconds(REFRESH_MARGIN_SECS))
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_secs(1)),
            None => IDLE_REFRESH_CHECK,
        }
    }

    /// Keeps the access token fresh for as long as the process runs.
    pub fn spawn_auto_refresh(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(self.until_refresh().await).await;
                match self.refresh_if_due().await {
                    Ok(Some(identity)) => {
                        debug!("Access token refreshed for {}", identity.user_id);
                        self.emit(AuthEvent::TokenRefreshed(identity));
                    }
                    Ok(None) => {}
                    Err(BackendError::Network(e)) => {
                        warn!("Token refresh failed, will retry: {e}");
                        tokio::time::sleep(IDLE_REFRESH_CHECK).await;
                    }
                    Err(e) => {
                        warn!("Token refresh rejected, ending session: {e}");
                        *self.session.write().await = None;
                        self.emit(AuthEvent::SignedOut);
                    }
                }
            }
        })
    }
}

#[async_trait]
impl ConnectionProbe for SupabaseClient {
    async fn probe(&self) -> Result<(), BackendError> {
        let _: Vec<serde_json::Value> = self
            .select(
                PROBE_TABLE,
                &[("select", "id".to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthBackend for SupabaseClient {
    async fn current_session(&self) -> Result<Option<AuthIdentity>, BackendError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(Some(session.identity.clone()));
        }
        let Some(token) = self.restore_token.lock().await.take() else {
            return Ok(None);
        };
        match self.refresh_with(&token).await {
            Ok(identity) => {
                info!("Restored backend session for {}", identity.user_id);
                Ok(Some(identity))
            }
            Err(BackendError::Network(e)) => Err(BackendError::Network(e)),
            Err(e) => {
                warn!("Persisted session could not be restored: {e}");
                Ok(None)
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError> {
        let session = self
            .token_grant("password", &Credentials { email, password })
            .await?;
        let identity = session.identity.clone();
        *self.session.write().await = Some(session);
        self.emit(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &NewProfile,
    ) -> Result<SignUp, BackendError> {
        let url = self.endpoint("auth/v1/signup")?;
        let response = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "name": profile.name, "role": profile.role },
            }))
            .send()
            .await?;
        let body: SignUpResponse = Self::check_auth(response).await?.json().await?;
        let (identity, session) = body.split()?;

        let session_issued = session.is_some();
        if let Some(session) = session {
            *self.session.write().await = Some(session);
            self.emit(AuthEvent::SignedIn(identity.clone()));
        }
        Ok(SignUp {
            identity,
            session_issued,
        })
    }

    async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<User, BackendError> {
        let row: ProfileRow = self
            .select_one(
                PROFILES,
                &[
                    ("select", "*".to_string()),
                    ("id", format!("eq.{}", identity.user_id)),
                ],
            )
            .await?;
        Ok(row.into_user(Some(&identity.email)))
    }

    async fn insert_profile(&self, user: &User) -> Result<User, BackendError> {
        let row: ProfileRow = self.insert(PROFILES, &ProfileRow::from(user)).await?;
        Ok(row.into_user(Some(&user.email)))
    }

    async fn update_profile(&self, user: &User) -> Result<(), BackendError> {
        self.update(
            PROFILES,
            &[("id", format!("eq.{}", user.id))],
            &ProfileUpdate::from(user),
        )
        .await
    }

    async fn list_profiles(&self) -> Result<Vec<User>, BackendError> {
        let rows: Vec<ProfileRow> = self
            .select(
                PROFILES,
                &[
                    ("select", "*".to_string()),
                    ("order", "name.asc".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().map(|row| row.into_user(None)).collect())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool, BackendError> {
        let removed = self.delete(PROFILES, &[("id", format!("eq.{id}"))]).await?;
        Ok(removed > 0)
    }

    async fn update_password(&self, new_password: &str) -> Result<(), BackendError> {
        if self.session.read().await.is_none() {
            return Err(BackendError::Unauthorized("no active session".to_string()));
        }
        let url = self.endpoint("auth/v1/user")?;
        let request = self
            .authorized(self.client.put(url))
            .await
            .json(&json!({ "password": new_password }));
        Self::check_auth(request.send().await?).await?;
        Ok(())
    }

    async fn sign_out(&self) -> Result<SignOut, BackendError> {
        let Some(session) = self.session.write().await.take() else {
            return Ok(SignOut::Ended);
        };
        let url = self.endpoint("auth/v1/logout")?;
        let result = self
            .client
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&session.access_token)
            .send()
            .await;
        match result {
            Ok(response) => {
                if let Err(e) = Self::check_auth(response).await {
                    warn!("Backend rejected sign-out, local session dropped anyway: {e}");
                }
            }
            Err(e) => warn!("Sign-out request failed, local session dropped anyway: {e}"),
        }
        self.emit(AuthEvent::SignedOut);
        Ok(SignOut::Ended)
    }

    async fn switch_role(&self, _current: Option<&User>) -> Result<User, BackendError> {
        Err(BackendError::Unsupported(
            "switching roles needs a separate account in live mode; sign in with that account instead"
                .to_string(),
        ))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AuthEvent>> {
        Some(self.events.subscribe())
    }
}
