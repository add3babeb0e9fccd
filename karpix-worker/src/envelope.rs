//! Response envelopes reported for every job.

use karpix_job_queue::HandlerResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message reported for a 200 response.
pub const SUCCESS_MESSAGE: &str = "success";

/// Code reported for any resolution or handler error.
pub const FAILURE_CODE: u16 = 500;

/// Envelope for a handler that returned normally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedEnvelope {
    pub endpoint: String,
    pub code: u16,
    pub id: Value,
    pub job_id: String,
    pub response: Value,
    pub message: Value,
    pub pid: u32,
    pub queue_id: String,
    pub run_time: f64,
    pub queue_time: f64,
    pub total_time: f64,
    pub queue_length: u64,
    pub build_number: String,
}

/// Measurements attached to a completed envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timings {
    pub run_time: f64,
    pub queue_time: f64,
    pub total_time: f64,
    pub queue_length: u64,
}

/// Identity of the job an envelope reports on.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeOrigin<'a> {
    pub id: Value,
    pub job_id: &'a str,
    pub pid: u32,
    pub queue_id: &'a str,
    pub build_number: &'a str,
}

impl CompletedEnvelope {
    /// Shape a handler response.
    ///
    /// A 200 puts the payload in `response` with message `"success"`; any other
    /// code moves the payload to `message` and leaves `response` null.
    pub fn from_response(response: HandlerResponse, origin: EnvelopeOrigin<'_>, timings: Timings) -> Self {
        let success = response.is_success();
        let HandlerResponse {
            payload,
            endpoint,
            code,
        } = response;
        let (response, message) = if success {
            (payload, Value::String(SUCCESS_MESSAGE.to_owned()))
        } else {
            (Value::Null, payload)
        };

        Self {
            endpoint,
            code,
            id: origin.id,
            job_id: origin.job_id.to_owned(),
            response,
            message,
            pid: origin.pid,
            queue_id: origin.queue_id.to_owned(),
            run_time: timings.run_time,
            queue_time: timings.queue_time,
            total_time: timings.total_time,
            queue_length: timings.queue_length,
            build_number: origin.build_number.to_owned(),
        }
    }
}

/// Envelope for a job whose handler could not be resolved or raised an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEnvelope {
    pub code: u16,
    pub id: Value,
    pub job_id: String,
    pub message: String,
    pub pid: u32,
    pub queue_id: String,
    pub build_number: String,
}

impl FailedEnvelope {
    pub fn new(message: impl Into<String>, origin: EnvelopeOrigin<'_>) -> Self {
        Self {
            code: FAILURE_CODE,
            id: origin.id,
            job_id: origin.job_id.to_owned(),
            message: message.into(),
            pid: origin.pid,
            queue_id: origin.queue_id.to_owned(),
            build_number: origin.build_number.to_owned(),
        }
    }
}

/// Either envelope, serialized flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Completed(CompletedEnvelope),
    Failed(FailedEnvelope),
}

impl ResponseEnvelope {
    pub fn code(&self) -> u16 {
        match self {
            Self::Completed(envelope) => envelope.code,
            Self::Failed(envelope) => envelope.code,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            Self::Completed(envelope) => &envelope.job_id,
            Self::Failed(envelope) => &envelope.job_id,
        }
    }

    /// The flat JSON object stored in status records, queue results and webhooks.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|error| {
            tracing::warn!(job_id = self.job_id(), %error, "failed to encode response envelope");
            Value::Null
        })
    }
}

impl From<CompletedEnvelope> for ResponseEnvelope {
    fn from(envelope: CompletedEnvelope) -> Self {
        Self::Completed(envelope)
    }
}

impl From<FailedEnvelope> for ResponseEnvelope {
    fn from(envelope: FailedEnvelope) -> Self {
        Self::Failed(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin() -> EnvelopeOrigin<'static> {
        EnvelopeOrigin {
            id: json!("X1"),
            job_id: "J1",
            pid: 42,
            queue_id: "default",
            build_number: "7",
        }
    }

    #[test]
    fn success_keeps_payload_in_response() {
        let envelope = CompletedEnvelope::from_response(
            HandlerResponse::ok(json!({"frames": 12}), "/run"),
            origin(),
            Timings::default(),
        );
        assert_eq!(envelope.code, 200);
        assert_eq!(envelope.response, json!({"frames": 12}));
        assert_eq!(envelope.message, json!("success"));
    }

    #[test]
    fn other_codes_move_payload_to_message() {
        let envelope = CompletedEnvelope::from_response(
            HandlerResponse::new("denied", "/run", 403),
            origin(),
            Timings::default(),
        );
        assert_eq!(envelope.response, Value::Null);
        assert_eq!(envelope.message, json!("denied"));
        assert_eq!(envelope.code, 403);
    }

    #[test]
    fn completed_serializes_flat_with_every_key() {
        let envelope = CompletedEnvelope::from_response(
            HandlerResponse::ok("ok", "/run"),
            origin(),
            Timings {
                run_time: 0.25,
                queue_time: 1.0,
                total_time: 1.25,
                queue_length: 3,
            },
        );
        let value = serde_json::to_value(ResponseEnvelope::from(envelope)).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "build_number", "code", "endpoint", "id", "job_id", "message", "pid",
                "queue_id", "queue_length", "queue_time", "response", "run_time", "total_time",
            ]
        );
        assert_eq!(value["queue_length"], 3);
    }

    #[test]
    fn failed_serializes_flat() {
        let envelope = ResponseEnvelope::from(FailedEnvelope::new("bad input", origin()));
        assert_eq!(envelope.code(), 500);
        assert_eq!(envelope.job_id(), "J1");
        assert_eq!(
            envelope.to_value(),
            json!({
                "code": 500,
                "id": "X1",
                "job_id": "J1",
                "message": "bad input",
                "pid": 42,
                "queue_id": "default",
                "build_number": "7",
            })
        );
    }
}
