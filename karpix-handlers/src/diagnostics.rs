//! Diagnostics handlers.

use std::time::Duration;

use async_trait::async_trait;
use karpix_job_queue::{HandlerCall, HandlerError, HandlerKey, HandlerResponse, JobHandler};
use serde_json::json;
use tracing::info;

use crate::handler_names::{DIAGNOSTICS_MODULE, ECHO, FAIL, RESPOND, SLEEP};

/// Upper bound for `sleep`, in seconds.
pub const MAX_SLEEP_SECS: f64 = 300.0;

fn endpoint(name: &str) -> String {
    format!("/v1/diagnostics/{name}")
}

/// Returns the job data and any extra arguments.
#[derive(Debug, Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for EchoHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::new(DIAGNOSTICS_MODULE, ECHO)
    }

    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, HandlerError> {
        let data = serde_json::to_value(&call.data)
            .map_err(|e| HandlerError::failed(format!("unable to encode data: {e}")))?;
        Ok(HandlerResponse::ok(
            json!({
                "job_id": call.job_id,
                "data": data,
                "args": call.args,
                "kwargs": call.kwargs,
            }),
            endpoint(ECHO),
        ))
    }
}

/// Waits for `seconds` (keyword argument, default 0).
#[derive(Debug, Default)]
pub struct SleepHandler;

impl SleepHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for SleepHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::new(DIAGNOSTICS_MODULE, SLEEP)
    }

    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, HandlerError> {
        let seconds = call.kwarg::<f64>("seconds")?.unwrap_or(0.0);
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(HandlerError::invalid_arguments(format!(
                "seconds must be a non-negative number, got {seconds}"
            )));
        }
        let seconds = seconds.min(MAX_SLEEP_SECS);

        info!(job_id = %call.job_id, seconds, "diagnostics sleep");
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;

        Ok(HandlerResponse::ok(json!({ "slept": seconds }), endpoint(SLEEP)))
    }
}

/// Answers with the `payload` and `code` keyword arguments (defaults: `null`, 200).
#[derive(Debug, Default)]
pub struct RespondHandler;

impl RespondHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for RespondHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::new(DIAGNOSTICS_MODULE, RESPOND)
    }

    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, HandlerError> {
        let code = call.kwarg::<u16>("code")?.unwrap_or(200);
        let payload = call.kwargs.get("payload").cloned().unwrap_or_default();
        Ok(HandlerResponse::new(payload, endpoint(RESPOND), code))
    }
}

/// Always fails with `message` (keyword argument) as the error text.
#[derive(Debug, Default)]
pub struct FailHandler;

impl FailHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for FailHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::new(DIAGNOSTICS_MODULE, FAIL)
    }

    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, HandlerError> {
        let message = call
            .kwarg::<String>("message")?
            .unwrap_or_else(|| "requested failure".to_owned());
        Err(HandlerError::Failed(message))
    }
}
