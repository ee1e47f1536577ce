//! SessionStore trait — per-session bounded message history.
//!
//! A session is created lazily on first access, mutated only by the agent
//! loop, and cleared explicitly. There is no durability guarantee; a process
//! restart loses all sessions. Implementations: in-memory (default). The
//! trait is the seam where a durable backend could be swapped in.

use crate::error::SessionError;
use crate::message::{Message, SessionId};
use async_trait::async_trait;

/// The core SessionStore trait.
///
/// Concurrent sessions are independent; implementations must serialize
/// mutation of a single session's history (the in-memory backend does this
/// with a map-level lock).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The backend name (e.g., "in_memory").
    fn name(&self) -> &str;

    /// Get the ordered message history for a session.
    /// Creates an empty session on first access.
    async fn history(&self, session: &SessionId)
    -> std::result::Result<Vec<Message>, SessionError>;

    /// Append a message to a session's history.
    async fn append(
        &self,
        session: &SessionId,
        message: Message,
    ) -> std::result::Result<(), SessionError>;

    /// Delete a session and its history. Clearing a nonexistent session is a
    /// no-op.
    async fn clear(&self, session: &SessionId) -> std::result::Result<(), SessionError>;

    /// Drop oldest messages until the history holds at most `max_len`.
    async fn trim(
        &self,
        session: &SessionId,
        max_len: usize,
    ) -> std::result::Result<(), SessionError>;
}
