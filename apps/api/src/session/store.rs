use tokio::sync::{mpsc, oneshot, watch};
use tracing::error;

use super::{Session, SessionUpdate};

const QUEUE_DEPTH: usize = 64;

type Envelope = (SessionUpdate, oneshot::Sender<()>);

/// Single writer for `Session`.
///
/// Every change is queued and applied one at a time by a dedicated task, so the
/// auth-event listener and explicit operations never interleave partial updates.
/// Readers see the latest applied value through a `watch` channel.
#[derive(Clone)]
pub struct SessionStore {
    updates: mpsc::Sender<Envelope>,
    snapshots: watch::Receiver<Session>,
}

impl SessionStore {
    /// Spawns the writer task; must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (updates, mut queue) = mpsc::channel::<Envelope>(QUEUE_DEPTH);
        let (publish, snapshots) = watch::channel(Session::default());

        tokio::spawn(async move {
            let mut session = Session::default();
            while let Some((update, applied)) = queue.recv().await {
                session.apply(update);
                publish.send_replace(session.clone());
                let _ = applied.send(());
            }
        });

        Self { updates, snapshots }
    }

    /// Queues `update` and waits until it is visible to readers.
    pub async fn apply(&self, update: SessionUpdate) {
        let (applied, done) = oneshot::channel();
        if self.updates.send((update, applied)).await.is_err() {
            error!("Session writer has stopped; update dropped");
            return;
        }
        let _ = done.await;
    }

    pub fn snapshot(&self) -> Session {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::User;
    use crate::session::{ConnectionMode, ConnectionStatus};

    #[tokio::test]
    async fn test_update_is_visible_after_apply_returns() {
        let store = SessionStore::spawn();
        store
            .apply(SessionUpdate::SetUser(Some(User::placeholder("u1", "a@b.com"))))
            .await;
        assert_eq!(store.snapshot().current_user.unwrap().id, "u1");
    }

    #[tokio::test]
    async fn test_concurrent_writers_last_applied_wins() {
        let store = SessionStore::spawn();
        let a = store.clone();
        let b = store.clone();
        let first = tokio::spawn(async move {
            a.apply(SessionUpdate::Connection(ConnectionStatus {
                mode: ConnectionMode::Demo,
                message: "network error".to_string(),
                latency_ms: Some(5),
            }))
            .await;
        });
        first.await.unwrap();
        b.apply(SessionUpdate::Connection(ConnectionStatus {
            mode: ConnectionMode::Live,
            message: "Connected to Supabase".to_string(),
            latency_ms: Some(12),
        }))
        .await;

        let session = store.snapshot();
        assert_eq!(session.mode, ConnectionMode::Live);
        assert_eq!(session.status_message, "Connected to Supabase");
        assert_eq!(session.latency_ms, Some(12));
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let store = SessionStore::spawn();
        let mut changes = store.subscribe();
        store.apply(SessionUpdate::PendingSync(true)).await;
        changes.changed().await.unwrap();
        assert!(changes.borrow().pending_sync);
    }
}
