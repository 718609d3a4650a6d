/// Shared application state passed to axum handlers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tradelink_core::session::Session;
use tradelink_core::store::LinkStore;
use tradelink_core::types::ChangeEvent;
use tradelink_core::view::ViewSynchronizer;
use uuid::Uuid;

/// One connected client: its mode/filter/edit state and last rendered view.
pub struct SessionEntry {
    pub session: Session,
    pub view: ViewSynchronizer,
    pub last_seen: Instant,
}

impl Default for SessionEntry {
    fn default() -> Self {
        Self {
            session: Session::default(),
            view: ViewSynchronizer::default(),
            last_seen: Instant::now(),
        }
    }
}

pub type SharedSession = Arc<Mutex<SessionEntry>>;

/// The map lock is only held to insert, look up or remove. Store calls run
/// under the per-session lock.
pub type SessionMap = Arc<Mutex<HashMap<Uuid, SharedSession>>>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LinkStore>,
    pub sessions: SessionMap,
    pub event_tx: broadcast::Sender<ChangeEvent>,
    pub port: u16,
    pub bind_address: String,
}

impl AppState {
    pub fn new(
        store: Arc<LinkStore>,
        event_tx: broadcast::Sender<ChangeEvent>,
        port: u16,
        bind_address: impl Into<String>,
    ) -> Self {
        Self {
            store,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            port,
            bind_address: bind_address.into(),
        }
    }

    pub async fn session(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Drop sessions not used for `idle`. Sessions busy with a request are kept.
    /// Returns the number removed.
    pub async fn sweep_idle_sessions(&self, idle: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| match entry.try_lock() {
            Ok(entry) => entry.last_seen.elapsed() < idle,
            Err(_) => true,
        });
        before - sessions.len()
    }
}
