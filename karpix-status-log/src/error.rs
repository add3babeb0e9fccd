use std::borrow::Cow;

use thiserror::Error;

/// Errors surfaced while recording job statuses.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatusLogError {
    #[error("failed to write status record: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode status record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("job id `{0}` cannot be used as a status file name")]
    InvalidJobId(String),
    #[error("unknown job status `{0}`")]
    UnknownStatus(Cow<'static, str>),
}
