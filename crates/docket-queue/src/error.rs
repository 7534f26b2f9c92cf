//! Error types for queue operations

use crate::job::{JobId, JobStatus};
use crate::store::StoreError;

/// Result alias used across the crate
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Malformed enqueue options, raised before any I/O
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("No handler registered for job '{0}'")]
    HandlerNotFound(String),

    /// A handler returned an error
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
