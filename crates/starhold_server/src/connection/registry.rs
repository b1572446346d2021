//! Shared registry of live sessions.
//!
//! One reader-writer lock over one ordered list is the entire
//! synchronization story: membership changes take the exclusive lock,
//! iteration takes the shared lock, and anything observed under either is
//! a fully constructed session. Insertion order is preserved, so
//! broadcasts always fan out oldest-session-first.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use super::session::ClientSession;
use super::SessionId;

/// Point-in-time description of one session, safe to hold after the
/// session itself is gone.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: String,
}

/// All currently connected sessions, in insertion order.
pub struct SessionRegistry {
    sessions: RwLock<Vec<Arc<ClientSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(Vec::new()),
        }
    }

    /// Add a session. Ids are allocated monotonically, so a duplicate
    /// insert is a caller bug.
    pub async fn insert(&self, session: Arc<ClientSession>) {
        let mut sessions = self.sessions.write().await;
        debug_assert!(
            sessions.iter().all(|s| s.id() != session.id()),
            "session id inserted twice"
        );
        sessions.push(session);
    }

    /// Remove the session with the given id, returning it if it was
    /// present. Unknown ids leave the registry untouched.
    pub async fn remove(&self, id: SessionId) -> Option<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        let index = sessions.iter().position(|s| s.id() == id)?;
        Some(sessions.remove(index))
    }

    /// Look up a live session by id.
    pub async fn find(&self, id: SessionId) -> Option<Arc<ClientSession>> {
        let sessions = self.sessions.read().await;
        sessions.iter().find(|s| s.id() == id).cloned()
    }

    /// Visit every live session under the shared lock, in insertion
    /// order.
    pub async fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&Arc<ClientSession>),
    {
        let sessions = self.sessions.read().await;
        for session in sessions.iter() {
            visit(session);
        }
    }

    /// Write `bytes` to every live session, holding the shared lock for
    /// the whole sweep so membership cannot shift mid-broadcast. Failed
    /// writes are logged and skipped; returns how many deliveries
    /// succeeded.
    pub async fn broadcast(&self, bytes: &[u8]) -> usize {
        let sessions = self.sessions.read().await;
        let mut delivered = 0;
        for session in sessions.iter() {
            match session.send(bytes).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Broadcast to session {} failed: {}", session.id(), e),
            }
        }
        delivered
    }

    /// Take every session out of the registry in one step, leaving it
    /// empty. Used during shutdown.
    pub async fn drain_all(&self) -> Vec<Arc<ClientSession>> {
        let mut sessions = self.sessions.write().await;
        std::mem::take(&mut *sessions)
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Snapshot of every session's id and peer, in insertion order.
    pub async fn snapshot_info(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .map(|s| SessionInfo {
                id: s.id(),
                peer: s.peer().to_string(),
            })
            .collect()
    }

    /// Blocking variant of [`snapshot_info`] for command worker threads,
    /// which run outside the async runtime.
    ///
    /// [`snapshot_info`]: SessionRegistry::snapshot_info
    pub fn blocking_snapshot_info(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.blocking_read();
        sessions
            .iter()
            .map(|s| SessionInfo {
                id: s.id(),
                peer: s.peer().to_string(),
            })
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
