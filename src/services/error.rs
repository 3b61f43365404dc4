use thiserror::Error;

use crate::ai::CompletionError;
use crate::db::RepositoryError;
use crate::queue::QueueError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => Self::NotFound(format!("{entity} {id}")),
            RepositoryError::Conflict { .. } => Self::Conflict(err.to_string()),
            other => Self::Repository(other),
        }
    }
}
