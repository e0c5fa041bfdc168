use thiserror::Error;

use cloudquote_core::store::SessionStoreError;

pub mod memory;
pub mod session;

pub use memory::InMemorySessionStore;
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for SessionStoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => Self::Backend(error.to_string()),
            RepositoryError::Decode(detail) => {
                Self::Decode { session_id: "unknown".to_string(), detail }
            }
        }
    }
}
