use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ConnectionMode, ConnectionStatus, Session, SessionStore, SessionUpdate};
use crate::backend::{AuthBackend, AuthEvent, AuthIdentity, BackendError, ConnectionProbe, SignOut};
use crate::models::user::{NewProfile, User, UserFilter, UserRole};

const MIN_PASSWORD_LEN: usize = 6;

pub const CONNECTED: &str = "Connected to Supabase";
pub const SCHEMA_MISSING: &str = "Connected, but tables not found (setup SQL required)";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid login credentials")]
    AuthenticationFailed,

    #[error("no user is signed in")]
    NotAuthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("role cannot change after registration")]
    RoleImmutable,

    #[error("{0}")]
    RoleSwitchUnavailable(String),

    /// The local session already shows the new profile; the backend does not.
    #[error("profile not saved to the backend: {0}")]
    PersistenceFailed(BackendError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

fn credential_error(e: BackendError) -> SessionError {
    match e {
        BackendError::InvalidCredentials => SessionError::AuthenticationFailed,
        other => SessionError::Backend(other),
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegisterOutcome {
    SignedIn { user: User },
    /// The account exists but no session was issued until the email is confirmed.
    ConfirmationRequired { email: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LogoutOutcome {
    SignedOut,
    /// Demo mode has nothing to sign out of; the session went back to the first seed user.
    DemoReset { user: User },
}

/// Owns the session lifecycle: probing, restoring and every auth action.
#[derive(Clone)]
pub struct SessionController {
    store: SessionStore,
    live: Arc<dyn AuthBackend>,
    probe: Arc<dyn ConnectionProbe>,
    fallback: Arc<dyn AuthBackend>,
    listening: Arc<AtomicBool>,
}

impl SessionController {
    pub fn new(
        store: SessionStore,
        live: Arc<dyn AuthBackend>,
        probe: Arc<dyn ConnectionProbe>,
        fallback: Arc<dyn AuthBackend>,
    ) -> Self {
        Self {
            store,
            live,
            probe,
            fallback,
            listening: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn snapshot(&self) -> Session {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.store.subscribe()
    }

    fn backend_for(&self, mode: ConnectionMode) -> &Arc<dyn AuthBackend> {
        if mode.is_live() {
            &self.live
        } else {
            &self.fallback
        }
    }

    fn backend(&self) -> &Arc<dyn AuthBackend> {
        self.backend_for(self.store.snapshot().mode)
    }

    /// Fetches the profile for `identity`, or a placeholder when the row is missing.
    async fn resolve_user(&self, backend: &Arc<dyn AuthBackend>, identity: &AuthIdentity) -> User {
        match backend.fetch_profile(identity).await {
            Ok(user) => user,
            Err(e) => {
                warn!(
                    "Profile for {} unavailable ({e}); using a placeholder",
                    identity.user_id
                );
                User::placeholder(&identity.user_id, &identity.email)
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Connectivity
    // ────────────────────────────────────────────────────────────────────────

    /// Re-checks the backend and records the outcome. Never fails.
    pub async fn probe_connection(&self) -> ConnectionStatus {
        let started = Instant::now();
        let result = self.probe.probe().await;
        let elapsed = Some(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX));

        let status = match result {
            Ok(()) => ConnectionStatus {
                mode: ConnectionMode::Live,
                message: CONNECTED.to_string(),
                latency_ms: elapsed,
            },
            Err(BackendError::Config(reason)) => ConnectionStatus {
                mode: ConnectionMode::Demo,
                message: reason,
                latency_ms: None,
            },
            Err(BackendError::Network(reason)) => ConnectionStatus {
                mode: ConnectionMode::Demo,
                message: format!("Network error: {reason}"),
                latency_ms: elapsed,
            },
            Err(BackendError::SchemaMissing(_)) => ConnectionStatus {
                mode: ConnectionMode::SetupRequired,
                message: SCHEMA_MISSING.to_string(),
                latency_ms: elapsed,
            },
            Err(e) => ConnectionStatus {
                mode: ConnectionMode::Demo,
                message: format!("Connection error: {e}"),
                latency_ms: elapsed,
            },
        };

        match status.mode {
            ConnectionMode::Live => info!("Backend reachable in {:?}ms", status.latency_ms),
            _ => warn!("Backend not usable ({:?}): {}", status.mode, status.message),
        }

        self.store
            .apply(SessionUpdate::Connection(status.clone()))
            .await;
        status
    }

    /// Startup sequence: probe, restore the user, start following auth events.
    pub async fn initialize(&self) -> Session {
        let status = self.probe_connection().await;
        let backend = self.backend_for(status.mode);

        let user = match backend.current_session().await {
            Ok(Some(identity)) => Some(self.resolve_user(backend, &identity).await),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not restore the previous session: {e}");
                None
            }
        };
        self.store.apply(SessionUpdate::SetUser(user)).await;

        self.spawn_auth_listener();
        self.snapshot()
    }

    /// Follows the live backend's auth events; a second call is a no-op.
    pub fn spawn_auth_listener(&self) -> Option<JoinHandle<()>> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return None;
        }
        let mut events = self.live.subscribe()?;
        let controller = self.clone();
        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => controller.on_auth_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Missed {skipped} auth events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    pub async fn on_auth_event(&self, event: AuthEvent) {
        let session = self.store.snapshot();
        if !session.mode.is_live() {
            debug!("Ignoring auth event outside live mode: {event:?}");
            return;
        }
        match event {
            AuthEvent::SignedOut => self.store.apply(SessionUpdate::SetUser(None)).await,
            AuthEvent::SignedIn(identity) if session.holds(&identity.user_id) => {
                debug!("{} already signed in locally", identity.user_id);
            }
            AuthEvent::SignedIn(identity) | AuthEvent::TokenRefreshed(identity) => {
                if session.pending_sync && session.holds(&identity.user_id) {
                    debug!("Keeping unsaved local profile for {}", identity.user_id);
                    return;
                }
                // Conditional updates: the store re-checks against whatever
                // login or register applied while the fetch was in flight.
                let update = match self.live.fetch_profile(&identity).await {
                    Ok(user) => SessionUpdate::Refreshed(user),
                    Err(e) => {
                        warn!("Profile for {} unavailable after auth event: {e}", identity.user_id);
                        SessionUpdate::Placeholder(User::placeholder(
                            &identity.user_id,
                            &identity.email,
                        ))
                    }
                };
                self.store.apply(update).await;
            }
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Auth actions
    // ────────────────────────────────────────────────────────────────────────

    pub async fn login(&self, email: &str, password: &str) -> Result<User, SessionError> {
        let backend = self.backend();
        let identity = backend
            .sign_in(email.trim(), password)
            .await
            .map_err(credential_error)?;
        let user = self.resolve_user(backend, &identity).await;
        info!("Signed in {} as {:?}", user.id, user.role);
        self.store
            .apply(SessionUpdate::SetUser(Some(user.clone())))
            .await;
        Ok(user)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        profile: NewProfile,
    ) -> Result<RegisterOutcome, SessionError> {
        let email = email.trim();
        if !email.contains('@') {
            return Err(SessionError::Validation("a valid email is required".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if profile.name.trim().is_empty() {
            return Err(SessionError::Validation("name cannot be empty".to_string()));
        }
        if profile.role == UserRole::Admin {
            return Err(SessionError::Validation(
                "admin accounts cannot self-register".to_string(),
            ));
        }

        let backend = self.backend();
        let signup = backend
            .sign_up(email, password, &profile)
            .await
            .map_err(credential_error)?;

        let draft = User::from_registration(&signup.identity.user_id, email, profile);
        let user = match backend.insert_profile(&draft).await {
            Ok(user) => user,
            Err(e) => {
                // The identity exists; the profile can be completed later.
                warn!("Profile row for {} not created: {e}", draft.id);
                draft
            }
        };

        if !signup.session_issued {
            info!("Registered {}; waiting for email confirmation", user.id);
            return Ok(RegisterOutcome::ConfirmationRequired {
                email: email.to_string(),
            });
        }

        self.store
            .apply(SessionUpdate::SetUser(Some(user.clone())))
            .await;
        Ok(RegisterOutcome::SignedIn { user })
    }

    /// Applies `user` locally at once, then persists it to the active backend.
    ///
    /// When persistence fails the local change stays and `pending_sync` is set.
    pub async fn update_profile(&self, user: User) -> Result<User, SessionError> {
        let session = self.store.snapshot();
        let current = session
            .current_user
            .ok_or(SessionError::NotAuthenticated)?;
        if user.id != current.id {
            return Err(SessionError::Validation(
                "profile belongs to a different user".to_string(),
            ));
        }
        if user.role != current.role {
            return Err(SessionError::RoleImmutable);
        }

        let user = user.normalized();
        self.store
            .apply(SessionUpdate::StageUser(user.clone()))
            .await;

        match self.backend_for(session.mode).update_profile(&user).await {
            Ok(()) => {
                self.store.apply(SessionUpdate::PendingSync(false)).await;
                Ok(user)
            }
            Err(e) => {
                error!("Profile for {} kept locally, save failed: {e}", user.id);
                self.store.apply(SessionUpdate::PendingSync(true)).await;
                Err(SessionError::PersistenceFailed(e))
            }
        }
    }

    pub async fn change_password(
        &self,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), SessionError> {
        if new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(SessionError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if new_password != confirmation {
            return Err(SessionError::Validation("passwords do not match".to_string()));
        }
        if !self.store.snapshot().is_authenticated() {
            return Err(SessionError::NotAuthenticated);
        }
        self.backend().update_password(new_password).await?;
        info!("Password updated");
        Ok(())
    }

    pub async fn logout(&self) -> Result<LogoutOutcome, SessionError> {
        match self.backend().sign_out().await? {
            SignOut::Ended => {
                self.store.apply(SessionUpdate::SetUser(None)).await;
                Ok(LogoutOutcome::SignedOut)
            }
            SignOut::Reset(user) => {
                info!("Demo session reset to {}", user.id);
                self.store
                    .apply(SessionUpdate::SetUser(Some(user.clone())))
                    .await;
                Ok(LogoutOutcome::DemoReset { user })
            }
        }
    }

    /// Demo convenience: flips between the seed candidate and the seed company.
    pub async fn switch_role(&self) -> Result<User, SessionError> {
        let current = self.store.snapshot().current_user;
        match self.backend().switch_role(current.as_ref()).await {
            Ok(user) => {
                self.store
                    .apply(SessionUpdate::SetUser(Some(user.clone())))
                    .await;
                Ok(user)
            }
            Err(BackendError::Unsupported(reason)) => {
                Err(SessionError::RoleSwitchUnavailable(reason))
            }
            Err(e) => Err(SessionError::Backend(e)),
        }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Moderation
    // ────────────────────────────────────────────────────────────────────────

    pub async fn list_users(&self, filter: &UserFilter) -> Result<Vec<User>, SessionError> {
        let mut users = self.backend().list_profiles().await?;
        users.retain(|u| filter.matches(u));
        Ok(users)
    }

    /// Removes another user's profile. Returns `false` if no such profile exists.
    pub async fn delete_user(&self, id: &str) -> Result<bool, SessionError> {
        if self.store.snapshot().holds(id) {
            return Err(SessionError::Validation(
                "you cannot delete the account you are signed in with".to_string(),
            ));
        }
        let removed = self.backend().delete_profile(id).await?;
        if removed {
            info!("Removed profile {id}");
        }
        Ok(removed)
    }
}
