//! Bookkeeping for connected clients.
//!
//! Each accepted connection registers a [`Session`] and removes it when its
//! handler returns, so [`SessionManager::active_count`] always reflects the
//! number of live connections.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One connected client.
#[derive(Debug, Clone)]
pub struct Session {
    /// Random session id (UUID v4).
    pub id: String,
    /// Peer label assigned by the listener.
    pub peer: String,
    /// Connect time, Unix milliseconds.
    pub connected_at: u64,
    /// Time of the last handled command, Unix milliseconds.
    pub last_activity: u64,
    /// Commands answered on this connection.
    pub commands_handled: u64,
}

impl Session {
    /// New session for `peer`, stamped with the current time.
    pub fn new(peer: String) -> Self {
        let now = Utc::now().timestamp_millis() as u64;
        Self {
            id: Uuid::new_v4().to_string(),
            peer,
            connected_at: now,
            last_activity: now,
            commands_handled: 0,
        }
    }

    /// Record one handled command.
    pub fn record_command(&mut self) {
        self.last_activity = Utc::now().timestamp_millis() as u64;
        self.commands_handled += 1;
    }
}

/// Shared registry of live connections.
#[derive(Clone, Debug)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionManager {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a new connection and return its session.
    pub async fn open_session(&self, peer: impl Into<String>) -> Session {
        let session = Session::new(peer.into());
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Copy of one session, if it is still registered.
    pub async fn get_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Count one handled command against a session.
    pub async fn record_command(&self, session_id: &str) -> bool {
        match self.sessions.write().await.get_mut(session_id) {
            Some(session) => {
                session.record_command();
                true
            }
            None => false,
        }
    }

    /// Unregister a session, returning its final record.
    pub async fn remove_session(&self, session_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(session_id)
    }

    /// Number of live connections.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// All live sessions, oldest first.
    pub async fn get_active_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.connected_at);
        sessions
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
