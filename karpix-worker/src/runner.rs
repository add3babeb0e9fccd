//! Executes one job: resolve, invoke, record, notify.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;
use karpix_job_queue::{HandlerError, HandlerRegistry, HandlerResponse, JobDescriptor};
use karpix_status_log::{StatusLogger, StatusRecord};
use karpix_webhook::WebhookNotifier;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::context::{round3, ExecutionContext};
use crate::envelope::{CompletedEnvelope, EnvelopeOrigin, FailedEnvelope, ResponseEnvelope, Timings};

/// Runs jobs against a handler registry, reporting every outcome to the
/// status log and, when requested, to the job's webhook.
#[derive(Clone)]
pub struct TaskRunner {
    registry: HandlerRegistry,
    status_log: Arc<dyn StatusLogger>,
    notifier: Arc<dyn WebhookNotifier>,
    build_number: String,
}

impl TaskRunner {
    pub fn new(
        registry: HandlerRegistry,
        status_log: Arc<dyn StatusLogger>,
        notifier: Arc<dyn WebhookNotifier>,
        build_number: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            status_log,
            notifier,
            build_number: build_number.into(),
        }
    }

    /// Run a job to completion.
    ///
    /// A `running` record is written before the handler is invoked and exactly
    /// one `done` or `failed` record after. Errors from the handler (or from
    /// resolving it) are returned unchanged once they have been recorded.
    pub async fn run(
        &self,
        job: &JobDescriptor,
        ctx: &ExecutionContext,
    ) -> Result<CompletedEnvelope, HandlerError> {
        let job_id = job.job_id.as_str();
        info!(
            job_id,
            module = %job.module_name,
            qualname = %job.qualname,
            queue_id = %ctx.queue_id,
            "job started"
        );
        self.log_status(
            job_id,
            StatusRecord::running(job_id, &ctx.queue_id, ctx.process_id),
        )
        .await;

        let started = Instant::now();
        match self.invoke(job).await {
            Ok(response) => {
                let run_time = started.elapsed().as_secs_f64();
                let timings = Timings {
                    run_time: round3(run_time),
                    queue_time: round3(ctx.queue_time()),
                    total_time: round3(ctx.total_time(Utc::now())),
                    queue_length: ctx.queue_length().await,
                };
                let envelope = CompletedEnvelope::from_response(response, self.origin(job, ctx), timings);
                let reported = ResponseEnvelope::from(envelope.clone());
                info!(job_id, code = reported.code(), run_time = envelope.run_time, "job done");

                let value = reported.to_value();
                self.log_status(
                    job_id,
                    StatusRecord::done(job_id, &ctx.queue_id, ctx.process_id, value.clone()),
                )
                .await;
                self.notify(job, &value).await;
                Ok(envelope)
            }
            Err(error) => {
                warn!(job_id, %error, "job failed");
                let reported =
                    ResponseEnvelope::from(FailedEnvelope::new(error.to_string(), self.origin(job, ctx)));

                let value = reported.to_value();
                self.log_status(
                    job_id,
                    StatusRecord::failed(job_id, &ctx.queue_id, ctx.process_id, value.clone()),
                )
                .await;
                self.notify(job, &value).await;
                Err(error)
            }
        }
    }

    async fn invoke(&self, job: &JobDescriptor) -> Result<HandlerResponse, HandlerError> {
        let call = job.to_call()?;
        let handler = self
            .registry
            .resolve(&job.module_name, &job.qualname)
            .await?;
        debug!(job_id = %job.job_id, handler = %handler.key(), "handler resolved");

        match AssertUnwindSafe(handler.handle(call)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        }
    }

    fn origin<'a>(&'a self, job: &'a JobDescriptor, ctx: &'a ExecutionContext) -> EnvelopeOrigin<'a> {
        EnvelopeOrigin {
            id: job.data.echo_id(),
            job_id: &job.job_id,
            pid: ctx.process_id,
            queue_id: &ctx.queue_id,
            build_number: &self.build_number,
        }
    }

    async fn log_status(&self, job_id: &str, record: StatusRecord) {
        if let Err(error) = self.status_log.record(job_id, &record).await {
            warn!(job_id, status = %record.job_status, %error, "failed to record job status");
        }
    }

    async fn notify(&self, job: &JobDescriptor, payload: &Value) {
        let Some(url) = job.data.webhook_target() else {
            return;
        };
        match self.notifier.notify(url, payload).await {
            Ok(()) => debug!(job_id = %job.job_id, url, "webhook delivered"),
            Err(error) => warn!(job_id = %job.job_id, url, %error, "webhook delivery failed"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
