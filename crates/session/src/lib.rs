//! Session store implementations for Quarry.
//!
//! The default (and only) backend keeps history in process memory: sessions
//! live exactly as long as the process, which is the contract the assistant
//! promises. The `SessionStore` trait in `quarry-core` is the seam where a
//! durable backend would plug in.

use async_trait::async_trait;
use quarry_core::error::SessionError;
use quarry_core::message::{Message, SessionId};
use quarry_core::session::SessionStore;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// An in-memory session store.
///
/// One map entry per session key, created lazily on first access. The
/// map-level lock serializes mutation, so concurrent invokes against the
/// same session cannot interleave history writes; distinct sessions never
/// share state.
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Number of live sessions (diagnostics only).
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn history(
        &self,
        session: &SessionId,
    ) -> std::result::Result<Vec<Message>, SessionError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.entry(session.0.clone()).or_default().clone())
    }

    async fn append(
        &self,
        session: &SessionId,
        message: Message,
    ) -> std::result::Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions.entry(session.0.clone()).or_default().push(message);
        Ok(())
    }

    async fn clear(&self, session: &SessionId) -> std::result::Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&session.0);
        Ok(())
    }

    async fn trim(
        &self,
        session: &SessionId,
        max_len: usize,
    ) -> std::result::Result<(), SessionError> {
        let mut sessions = self.sessions.write().await;
        if let Some(history) = sessions.get_mut(&session.0) {
            if history.len() > max_len {
                let excess = history.len() - max_len;
                history.drain(..excess);
            }
        }
        Ok(())
    }
}
