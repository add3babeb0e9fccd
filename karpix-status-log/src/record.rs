use std::borrow::Cow;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StatusLogError;

/// Lifecycle stage reported for a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Failed,
}

impl JobStatus {
    #[inline]
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true if no further record follows this one for the same execution.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = StatusLogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("running") {
            Ok(Self::Running)
        } else if s.eq_ignore_ascii_case("done") {
            Ok(Self::Done)
        } else if s.eq_ignore_ascii_case("failed") {
            Ok(Self::Failed)
        } else {
            Err(StatusLogError::UnknownStatus(Cow::Owned(s.to_owned())))
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// One status transition of a job.
///
/// `response` is null while the job is running and carries the response
/// envelope once the job is done or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub job_status: JobStatus,
    pub job_id: String,
    pub queue_id: String,
    pub process_id: u32,
    pub response: Option<Value>,
}

impl StatusRecord {
    #[must_use]
    pub fn running(job_id: impl Into<String>, queue_id: impl Into<String>, process_id: u32) -> Self {
        Self {
            job_status: JobStatus::Running,
            job_id: job_id.into(),
            queue_id: queue_id.into(),
            process_id,
            response: None,
        }
    }

    #[must_use]
    pub fn done(
        job_id: impl Into<String>,
        queue_id: impl Into<String>,
        process_id: u32,
        response: Value,
    ) -> Self {
        Self {
            job_status: JobStatus::Done,
            job_id: job_id.into(),
            queue_id: queue_id.into(),
            process_id,
            response: Some(response),
        }
    }

    #[must_use]
    pub fn failed(
        job_id: impl Into<String>,
        queue_id: impl Into<String>,
        process_id: u32,
        response: Value,
    ) -> Self {
        Self {
            job_status: JobStatus::Failed,
            job_id: job_id.into(),
            queue_id: queue_id.into(),
            process_id,
            response: Some(response),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn running_record_serializes_null_response() {
        let record = StatusRecord::running("J1", "default", 7);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "job_status": "running",
                "job_id": "J1",
                "queue_id": "default",
                "process_id": 7,
                "response": null
            })
        );
    }

    #[test]
    fn status_labels_parse_back() {
        for status in [JobStatus::Running, JobStatus::Done, JobStatus::Failed] {
            assert_eq!(status.as_label().parse::<JobStatus>().unwrap(), status);
        }
        assert!("queued".parse::<JobStatus>().is_err());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }
}
