//! Core types for the job queue system.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::HandlerError;

/// Keyword arguments a caller may not supply because the worker always passes them.
pub const RESERVED_KWARGS: [&str; 2] = ["job_id", "data"];

/// Open-ended job data.
///
/// `id` and `webhook_url` are the only fields the worker inspects; everything
/// else is carried through to the handler in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobData {
    /// Caller-side identifier echoed back in every response envelope.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobData {
    #[inline]
    pub fn with_id(id: impl Into<Value>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn webhook(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The webhook target, if one was supplied and is not blank.
    pub fn webhook_target(&self) -> Option<&str> {
        self.webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// The id to echo, `null` when the caller did not send one.
    #[inline]
    pub fn echo_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }
}

/// A unit of work as placed on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub module_name: String,
    pub qualname: String,
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub data: JobData,
    #[serde(default)]
    pub call_args: Vec<Value>,
    #[serde(default)]
    pub call_kwargs: Map<String, Value>,
}

impl JobDescriptor {
    pub fn new(
        module_name: impl Into<String>,
        qualname: impl Into<String>,
        job_id: impl Into<String>,
        data: JobData,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            qualname: qualname.into(),
            job_id: job_id.into(),
            data,
            call_args: Vec::new(),
            call_kwargs: Map::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.call_args = args;
        self
    }

    #[must_use]
    pub fn with_kwarg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.call_kwargs.insert(key.into(), value.into());
        self
    }

    /// Assign a fresh id when the producer left it blank.
    pub(crate) fn ensure_job_id(&mut self) -> &str {
        if self.job_id.is_empty() {
            self.job_id = Uuid::new_v4().to_string();
        }
        &self.job_id
    }

    /// Build the handler invocation, rejecting keyword arguments that shadow
    /// the job id or data.
    pub fn to_call(&self) -> Result<HandlerCall, HandlerError> {
        if let Some(name) = RESERVED_KWARGS
            .iter()
            .find(|name| self.call_kwargs.contains_key(**name))
        {
            return Err(HandlerError::ArgumentCollision((*name).to_owned()));
        }
        Ok(HandlerCall {
            job_id: self.job_id.clone(),
            data: self.data.clone(),
            args: self.call_args.clone(),
            kwargs: self.call_kwargs.clone(),
        })
    }
}

/// Arguments passed to a handler. `job_id` and `data` always come first.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerCall {
    pub job_id: String,
    pub data: JobData,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl HandlerCall {
    /// Decode a keyword argument, `None` when absent.
    pub fn kwarg<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, HandlerError> {
        match self.kwargs.get(name) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| HandlerError::invalid_arguments(format!("{name}: {e}"))),
            None => Ok(None),
        }
    }

    /// Decode a positional argument, `None` when absent.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<Option<T>, HandlerError> {
        match self.args.get(index) {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| HandlerError::invalid_arguments(format!("argument {index}: {e}"))),
            None => Ok(None),
        }
    }
}

/// What a handler returns: `(payload, endpoint, status code)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub payload: Value,
    pub endpoint: String,
    pub code: u16,
}

impl HandlerResponse {
    pub fn new(payload: impl Into<Value>, endpoint: impl Into<String>, code: u16) -> Self {
        Self {
            payload: payload.into(),
            endpoint: endpoint.into(),
            code,
        }
    }

    /// A 200 response.
    #[inline]
    pub fn ok(payload: impl Into<Value>, endpoint: impl Into<String>) -> Self {
        Self::new(payload, endpoint, 200)
    }

    /// Only 200 counts as success; every other code routes the payload to `message`.
    #[inline]
    pub const fn is_success(&self) -> bool {
        self.code == 200
    }
}

/// Result returned after a job has been enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueResult {
    pub job_id: String,
}

/// Lifecycle of a job as tracked by the queue backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum QueueJobStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

impl QueueJobStatus {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }

    /// Returns true if this status represents a terminal state.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl std::fmt::Display for QueueJobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job claimed from the queue, together with the metadata the backend kept for it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub descriptor: JobDescriptor,
    /// Name of the queue the job was enqueued on.
    pub origin: String,
    pub enqueued_at: Option<DateTime<Utc>>,
}
