use async_trait::async_trait;
use thiserror::Error;

use crate::domain::session::{DialogueSession, SessionId};
use crate::errors::ApplicationError;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session backend failure: {0}")]
    Backend(String),
    #[error("stored session `{session_id}` could not be decoded: {detail}")]
    Decode { session_id: String, detail: String },
}

/// Keyed persistence for dialogue sessions.
///
/// `get` returns `None` for ids never stored (or deleted); callers create fresh
/// sessions for those.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<DialogueSession>, SessionStoreError>;
    async fn set(&self, session: &DialogueSession) -> Result<(), SessionStoreError>;
    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError>;
}

impl From<SessionStoreError> for ApplicationError {
    fn from(error: SessionStoreError) -> Self {
        Self::Persistence(error.to_string())
    }
}
