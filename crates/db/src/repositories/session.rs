use async_trait::async_trait;
use sqlx::Row;

use cloudquote_core::domain::session::{DialogueSession, SessionId};
use cloudquote_core::store::{SessionStore, SessionStoreError};

use super::RepositoryError;
use crate::DbPool;

/// Sessions stored as JSON snapshots, one row per session id.
pub struct SqlSessionStore {
    pool: DbPool,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn find(&self, id: &SessionId) -> Result<Option<String>, RepositoryError> {
        let row = sqlx::query("SELECT snapshot_json FROM dialogue_sessions WHERE session_id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            row.try_get::<String, _>("snapshot_json")
                .map_err(|error| RepositoryError::Decode(error.to_string()))
        })
        .transpose()
    }

    async fn upsert(&self, session: &DialogueSession, snapshot: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO dialogue_sessions (session_id, mode, turn_count, snapshot_json,
                                            created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 mode = excluded.mode,
                 turn_count = excluded.turn_count,
                 snapshot_json = excluded.snapshot_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&session.session_id.0)
        .bind(session.mode.as_str())
        .bind(i64::from(session.turn_count))
        .bind(snapshot)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM dialogue_sessions WHERE session_id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqlSessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<DialogueSession>, SessionStoreError> {
        let Some(snapshot) = self.find(id).await? else {
            return Ok(None);
        };

        serde_json::from_str(&snapshot).map(Some).map_err(|error| SessionStoreError::Decode {
            session_id: id.0.clone(),
            detail: error.to_string(),
        })
    }

    async fn set(&self, session: &DialogueSession) -> Result<(), SessionStoreError> {
        let snapshot = serde_json::to_string(session).map_err(|error| {
            SessionStoreError::Decode {
                session_id: session.session_id.0.clone(),
                detail: error.to_string(),
            }
        })?;
        Ok(self.upsert(session, &snapshot).await?)
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionStoreError> {
        Ok(self.remove(id).await?)
    }
}
