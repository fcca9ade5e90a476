//! Session / connection controller.
//!
//! One `Session` value per running instance, owned by a `SessionStore` task and
//! changed only through `SessionUpdate` messages. `SessionController` decides the
//! connection mode from the last probe and routes auth operations to the live or
//! fallback backend accordingly.

use serde::Serialize;

use crate::models::user::User;

pub mod controller;
pub mod store;
#[cfg(test)]
pub mod testing;

pub use controller::{LogoutOutcome, RegisterOutcome, SessionController, SessionError};
pub use store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionMode {
    /// No probe has completed yet.
    #[default]
    Initializing,
    Live,
    Demo,
    SetupRequired,
}

impl ConnectionMode {
    /// Whether writes reach the backend.
    pub fn is_live(self) -> bool {
        self == ConnectionMode::Live
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initializing,
    LiveAuthenticated,
    LiveAnonymous,
    Demo,
    SetupRequired,
}

/// Result of one connectivity probe. Mode, message and latency always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub mode: ConnectionMode,
    pub message: String,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub current_user: Option<User>,
    pub mode: ConnectionMode,
    pub status_message: String,
    pub latency_ms: Option<u64>,
    /// Set while a profile write has not reached the backend; local state is ahead of it.
    pub pending_sync: bool,
}

/// The only ways `Session` changes.
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Connection(ConnectionStatus),
    /// Replace the current user wholesale and clear `pending_sync`.
    SetUser(Option<User>),
    /// Optimistic profile write: replace the user and mark it unsaved.
    StageUser(User),
    PendingSync(bool),
    /// Profile fetched after a backend auth event. Dropped while the same
    /// user has unsaved local changes.
    Refreshed(User),
    /// Placeholder for an identity whose profile could not be read. Never
    /// replaces a user with the same id.
    Placeholder(User),
}

impl Session {
    pub fn apply(&mut self, update: SessionUpdate) {
        match update {
            SessionUpdate::Connection(status) => {
                self.mode = status.mode;
                self.status_message = status.message;
                self.latency_ms = status.latency_ms;
            }
            SessionUpdate::SetUser(user) => {
                self.current_user = user;
                self.pending_sync = false;
            }
            SessionUpdate::StageUser(user) => {
                self.current_user = Some(user);
                self.pending_sync = true;
            }
            SessionUpdate::PendingSync(pending) => self.pending_sync = pending,
            SessionUpdate::Refreshed(user) => {
                if !(self.pending_sync && self.holds(&user.id)) {
                    self.current_user = Some(user);
                    self.pending_sync = false;
                }
            }
            SessionUpdate::Placeholder(user) => {
                if !self.holds(&user.id) {
                    self.current_user = Some(user);
                    self.pending_sync = false;
                }
            }
        }
    }

    /// Whether the current user is `id`.
    pub fn holds(&self, id: &str) -> bool {
        self.current_user.as_ref().is_some_and(|u| u.id == id)
    }

    pub fn state(&self) -> SessionState {
        match self.mode {
            ConnectionMode::Initializing => SessionState::Initializing,
            ConnectionMode::Live if self.current_user.is_some() => SessionState::LiveAuthenticated,
            ConnectionMode::Live => SessionState::LiveAnonymous,
            ConnectionMode::Demo => SessionState::Demo,
            ConnectionMode::SetupRequired => SessionState::SetupRequired,
        }
    }

    pub fn is_demo_mode(&self) -> bool {
        self.mode == ConnectionMode::Demo
    }

    pub fn is_setup_required(&self) -> bool {
        self.mode == ConnectionMode::SetupRequired
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }
}
