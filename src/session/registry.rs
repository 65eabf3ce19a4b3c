use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::connection::UserId;
use super::session::{Session, SessionContext};

/// Owns at most one [`Session`] per identity.
///
/// Sessions are created lazily and never evicted, so their backlog survives
/// every disconnect.
pub struct SessionRegistry {
    sessions: DashMap<UserId, Arc<Session>>,
    context: Arc<SessionContext>,
}

impl SessionRegistry {
    pub fn new(context: Arc<SessionContext>) -> Self {
        Self {
            sessions: DashMap::new(),
            context,
        }
    }

    /// Returns the session for `identity`, creating it on first use.
    /// Concurrent callers for the same identity always get the same session.
    pub fn get_or_create(&self, identity: &str) -> Arc<Session> {
        let session = self
            .sessions
            .entry(identity.to_string())
            .or_insert_with(|| {
                debug!(identity = %identity, "Creating session");
                Arc::new(Session::new(identity, Arc::clone(&self.context)))
            });
        Arc::clone(session.value())
    }

    /// Returns the session for `identity` without creating one
    pub fn get(&self, identity: &str) -> Option<Arc<Session>> {
        self.sessions
            .get(identity)
            .map(|session| Arc::clone(session.value()))
    }

    /// Flushes the backlog of an existing session.
    /// Returns false when there is no session or it is not alive.
    #[instrument(skip(self))]
    pub async fn flush(&self, identity: &str) -> bool {
        match self.get(identity) {
            Some(session) => session.flush().await,
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions with at least one open connection
    pub async fn online_count(&self) -> usize {
        // Collect first so no shard lock is held across an await
        let sessions: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut online = 0;
        for session in sessions {
            if session.is_alive().await {
                online += 1;
            }
        }
        online
    }
}
