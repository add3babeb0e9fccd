//! Error types for the job queue system.

use thiserror::Error;

/// Errors that may occur while interacting with the queue backend.
#[derive(Debug, Error)]
pub enum JobQueueError {
    #[error("job queue backend is unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),

    #[error("job {job_id} is malformed: {reason}")]
    Malformed { job_id: String, reason: String },

    #[error("job not found: {0}")]
    NotFound(String),

    #[error("failed to encode job: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A handler could not be located for a `(module, qualname)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("No module named '{0}'")]
    ModuleNotFound(String),

    #[error("module '{module}' has no attribute '{qualname}'")]
    AttributeNotFound { module: String, qualname: String },
}

/// Failure raised while resolving or running a handler.
///
/// The display string of a `Failed` error is the bare message so it can be
/// surfaced to webhook subscribers unchanged.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("keyword argument `{0}` collides with a reserved handler parameter")]
    ArgumentCollision(String),

    #[error("handler panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::InvalidArguments(message.into())
    }
}
