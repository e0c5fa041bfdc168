use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use cloudquote_core::domain::session::{DialogueSession, SessionId};
use cloudquote_core::store::{SessionStore, SessionStoreError};

/// Process-local session map. Sessions live until deleted; there is no eviction.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, DialogueSession>>,
}

impl InMemorySessionStore {
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<DialogueSession>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn set(&self, session: &DialogueSession) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.0.clone(), session.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id.0);
        Ok(())
    }
}
