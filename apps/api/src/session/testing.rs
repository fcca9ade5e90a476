//! Scripted in-memory backend for controller and router tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::backend::fallback::{FallbackBackend, FallbackDataset};
use crate::backend::{
    AuthBackend, AuthEvent, AuthIdentity, BackendError, ConnectionProbe, SignOut, SignUp,
};
use crate::models::user::{NewProfile, User, UserRole};
use crate::session::{SessionController, SessionStore};

#[derive(Debug, Clone, Copy)]
pub enum ProbeScript {
    Ok,
    Config,
    Network,
    SchemaMissing,
    Query,
}

#[derive(Default)]
struct Script {
    probe: Option<ProbeScript>,
    accounts: Vec<(String, String, String)>,
    profiles: Vec<User>,
    session: Option<AuthIdentity>,
    require_confirmation: bool,
    fail_profile_insert: bool,
    fail_profile_update: bool,
    insert_delay: Duration,
    fetch_delay: Duration,
    calls: Vec<&'static str>,
}

pub struct ScriptedBackend {
    script: Mutex<Script>,
    events: broadcast::Sender<AuthEvent>,
}

impl ScriptedBackend {
    pub fn new(probe: ProbeScript) -> Arc<Self> {
        let (events, _) = broadcast::channel(8);
        Arc::new(Self {
            script: Mutex::new(Script {
                probe: Some(probe),
                ..Default::default()
            }),
            events,
        })
    }

    pub fn set_probe(&self, probe: ProbeScript) {
        self.script.lock().unwrap().probe = Some(probe);
    }

    /// Adds an auth account; with `role` set a profile row is created too.
    pub fn add_account(&self, id: &str, email: &str, password: &str, role: Option<UserRole>) {
        let mut script = self.script.lock().unwrap();
        script
            .accounts
            .push((id.to_string(), email.to_string(), password.to_string()));
        if let Some(role) = role {
            let mut user = User::placeholder(id, email);
            user.name = format!("{email} profile");
            user.role = role;
            script.profiles.push(user.normalized());
        }
    }

    pub fn restore_session(&self, id: &str, email: &str) {
        self.script.lock().unwrap().session = Some(AuthIdentity {
            user_id: id.to_string(),
            email: email.to_string(),
        });
    }

    pub fn require_confirmation(&self, on: bool) {
        self.script.lock().unwrap().require_confirmation = on;
    }

    pub fn fail_profile_insert(&self, on: bool) {
        self.script.lock().unwrap().fail_profile_insert = on;
    }

    pub fn fail_profile_update(&self, on: bool) {
        self.script.lock().unwrap().fail_profile_update = on;
    }

    /// Backend round-trip times. A fetch reads the row before waiting, so a
    /// slow fetch can answer with a row that was missing when it started.
    pub fn latency(&self, insert: Duration, fetch: Duration) {
        let mut script = self.script.lock().unwrap();
        script.insert_delay = insert;
        script.fetch_delay = fetch;
    }

    pub fn profile(&self, id: &str) -> Option<User> {
        self.script
            .lock()
            .unwrap()
            .profiles
            .iter()
            .find(|u| u.id == id)
            .cloned()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, call: &'static str) {
        self.script.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ConnectionProbe for ScriptedBackend {
    async fn probe(&self) -> Result<(), BackendError> {
        let probe = self.script.lock().unwrap().probe;
        match probe.unwrap_or(ProbeScript::Ok) {
            ProbeScript::Ok => Ok(()),
            ProbeScript::Config => Err(BackendError::Config("Supabase URL is not configured".into())),
            ProbeScript::Network => Err(BackendError::Network("connection refused".into())),
            ProbeScript::SchemaMissing => Err(BackendError::from_query(
                Some("PGRST205".into()),
                "Could not find the table 'public.jobs'".into(),
            )),
            ProbeScript::Query => Err(BackendError::from_query(
                Some("42501".into()),
                "permission denied".into(),
            )),
        }
    }
}

#[async_trait]
impl AuthBackend for ScriptedBackend {
    async fn current_session(&self) -> Result<Option<AuthIdentity>, BackendError> {
        self.record("current_session");
        Ok(self.script.lock().unwrap().session.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthIdentity, BackendError> {
        self.record("sign_in");
        let mut script = self.script.lock().unwrap();
        let identity = script
            .accounts
            .iter()
            .find(|(_, e, p)| e == email && p == password)
            .map(|(id, e, _)| AuthIdentity {
                user_id: id.clone(),
                email: e.clone(),
            })
            .ok_or(BackendError::InvalidCredentials)?;
        script.session = Some(identity.clone());
        drop(script);
        self.emit(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        _profile: &NewProfile,
    ) -> Result<SignUp, BackendError> {
        self.record("sign_up");
        let mut script = self.script.lock().unwrap();
        let id = format!("live-{}", script.accounts.len() + 1);
        script
            .accounts
            .push((id.clone(), email.to_string(), password.to_string()));
        let identity = AuthIdentity {
            user_id: id,
            email: email.to_string(),
        };
        let session_issued = !script.require_confirmation;
        if session_issued {
            script.session = Some(identity.clone());
        }
        drop(script);
        if session_issued {
            self.emit(AuthEvent::SignedIn(identity.clone()));
        }
        Ok(SignUp {
            identity,
            session_issued,
        })
    }

    async fn fetch_profile(&self, identity: &AuthIdentity) -> Result<User, BackendError> {
        self.record("fetch_profile");
        let row = self.profile(&identity.user_id);
        let delay = self.script.lock().unwrap().fetch_delay;
        tokio::time::sleep(delay).await;
        row.ok_or(BackendError::Query {
            code: "PGRST116".into(),
            message: "no rows".into(),
        })
    }

    async fn insert_profile(&self, user: &User) -> Result<User, BackendError> {
        self.record("insert_profile");
        let delay = self.script.lock().unwrap().insert_delay;
        tokio::time::sleep(delay).await;
        let mut script = self.script.lock().unwrap();
        if script.fail_profile_insert {
            return Err(BackendError::Unauthorized("row-level security".into()));
        }
        script.profiles.push(user.clone());
        Ok(user.clone())
    }

    async fn update_profile(&self, user: &User) -> Result<(), BackendError> {
        self.record("update_profile");
        let mut script = self.script.lock().unwrap();
        if script.fail_profile_update {
            return Err(BackendError::Network("connection reset".into()));
        }
        if let Some(existing) = script.profiles.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        }
        Ok(())
    }

    async fn list_profiles(&self) -> Result<Vec<User>, BackendError> {
        self.record("list_profiles");
        Ok(self.script.lock().unwrap().profiles.clone())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool, BackendError> {
        self.record("delete_profile");
        let mut script = self.script.lock().unwrap();
        let before = script.profiles.len();
        script.profiles.retain(|u| u.id != id);
        Ok(script.profiles.len() < before)
    }

    async fn update_password(&self, new_password: &str) -> Result<(), BackendError> {
        self.record("update_password");
        let mut script = self.script.lock().unwrap();
        let id = script
            .session
            .as_ref()
            .map(|s| s.user_id.clone())
            .ok_or_else(|| BackendError::Unauthorized("no active session".into()))?;
        if let Some(account) = script.accounts.iter_mut().find(|(i, _, _)| *i == id) {
            account.2 = new_password.to_string();
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<SignOut, BackendError> {
        self.record("sign_out");
        let ended = self.script.lock().unwrap().session.take();
        if ended.is_some() {
            self.emit(AuthEvent::SignedOut);
        }
        Ok(SignOut::Ended)
    }

    async fn switch_role(&self, _current: Option<&User>) -> Result<User, BackendError> {
        self.record("switch_role");
        Err(BackendError::Unsupported(
            "switching roles needs a separate account in live mode".into(),
        ))
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<AuthEvent>> {
        Some(self.events.subscribe())
    }
}

pub fn fallback() -> Arc<FallbackBackend> {
    Arc::new(FallbackBackend::new(&FallbackDataset::load().unwrap()))
}

/// A fresh controller with `live` as the live backend and the seed dataset as fallback.
pub fn controller_with(live: &Arc<ScriptedBackend>) -> SessionController {
    SessionController::new(SessionStore::spawn(), live.clone(), live.clone(), fallback())
}

pub fn new_profile(name: &str, role: UserRole) -> NewProfile {
    NewProfile {
        name: name.to_string(),
        role,
        avatar: None,
        location: None,
        company: None,
        candidate: None,
    }
}
