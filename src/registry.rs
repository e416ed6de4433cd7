//! Concurrent registry of interactive sessions.
//!
//! The registry map is the only state shared across sessions; each session
//! guards its own buffer and lifecycle, so no registry operation turns the
//! engine into a single serialization point.

use crate::config::SessionConfig;
use crate::errors::{SessionError, SessionResult};
use crate::session::InteractiveSession;
use crate::types::{SessionState, Snapshot};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Owns every session for the process lifetime. Construct one instance at
/// startup and share it. There is no persistence and no eviction; sessions
/// stay until cancelled away by [`SessionRegistry::clear`].
///
/// `create` starts a background reader, so the registry must be used from
/// within a Tokio runtime.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<InteractiveSession>>>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create and start a session for an opaque command string, returning a
    /// handle immediately; the caller does not wait for the process to get
    /// anywhere. Spawn failure shows up as a `failed` snapshot, not an error.
    pub fn create(&self, command: &str) -> Snapshot {
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(InteractiveSession::new(
            id.clone(),
            command.to_string(),
            self.config.clone(),
        ));
        self.sessions.write().insert(id.clone(), Arc::clone(&session));
        session.start();
        info!("[registry] session {id} created");
        session.snapshot()
    }

    pub fn get(&self, id: &str) -> Option<Arc<InteractiveSession>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn snapshot(&self, id: &str) -> SessionResult<Snapshot> {
        self.get(id)
            .map(|s| s.snapshot())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub fn send_text(&self, id: &str, text: &str) -> SessionResult<()> {
        self.get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?
            .send(text)
    }

    /// Send the Enter key.
    pub fn send_enter(&self, id: &str) -> SessionResult<()> {
        self.get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?
            .send_enter()
    }

    /// Cancel a session. Bounded by the configured grace period; already
    /// terminated sessions return Ok without waiting.
    pub async fn cancel(&self, id: &str) -> SessionResult<()> {
        let session = self
            .get(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        session.cancel().await;
        Ok(())
    }

    /// Cancel every still-running session, then empty the registry. Used for
    /// full shutdown or reset; later lookups of any prior id are NotFound.
    pub async fn clear(&self) {
        let sessions: Vec<_> = self.sessions.read().values().cloned().collect();
        for session in sessions {
            if session.state() == SessionState::Running {
                session.cancel().await;
            }
        }
        let drained = {
            let mut map = self.sessions.write();
            let n = map.len();
            map.clear();
            n
        };
        info!("[registry] cleared {drained} sessions");
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
