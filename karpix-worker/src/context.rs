//! Per-invocation execution context.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use karpix_job_queue::{QueueInspector, QueuedJob};

/// Queue id reported when a job runs outside a live queue.
pub const DETACHED_QUEUE_ID: &str = "rq";

/// Metadata about the job being executed, passed explicitly to the runner.
#[derive(Clone)]
pub struct ExecutionContext {
    pub queue_id: String,
    pub process_id: u32,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    inspector: Option<Arc<dyn QueueInspector>>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("queue_id", &self.queue_id)
            .field("process_id", &self.process_id)
            .field("enqueued_at", &self.enqueued_at)
            .field("started_at", &self.started_at)
            .field("inspector", &self.inspector.as_ref().map(|_| "<dyn QueueInspector>"))
            .finish()
    }
}

impl ExecutionContext {
    /// Context for a job run without a queue (local invocation, tests).
    pub fn detached() -> Self {
        Self {
            queue_id: DETACHED_QUEUE_ID.to_owned(),
            process_id: std::process::id(),
            enqueued_at: None,
            started_at: Utc::now(),
            inspector: None,
        }
    }

    /// Context for a job claimed from a queue.
    pub fn for_job(job: &QueuedJob, inspector: Arc<dyn QueueInspector>) -> Self {
        Self {
            queue_id: job.origin.clone(),
            process_id: std::process::id(),
            enqueued_at: job.enqueued_at,
            started_at: Utc::now(),
            inspector: Some(inspector),
        }
    }

    #[must_use]
    pub fn with_enqueued_at(mut self, enqueued_at: Option<DateTime<Utc>>) -> Self {
        self.enqueued_at = enqueued_at;
        self
    }

    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Enqueue time, falling back to the start time when unknown.
    #[inline]
    pub fn enqueue_reference(&self) -> DateTime<Utc> {
        self.enqueued_at.unwrap_or(self.started_at)
    }

    /// Seconds the job waited in the queue; never negative.
    pub fn queue_time(&self) -> f64 {
        seconds_between(self.enqueue_reference(), self.started_at)
    }

    /// Seconds from enqueue to `now`; never negative.
    pub fn total_time(&self, now: DateTime<Utc>) -> f64 {
        seconds_between(self.enqueue_reference(), now)
    }

    /// Current queue depth, 0 when detached or when the backend cannot answer.
    pub async fn queue_length(&self) -> u64 {
        let Some(inspector) = &self.inspector else {
            return 0;
        };
        match inspector.queue_length().await {
            Ok(len) => len,
            Err(error) => {
                tracing::debug!(%error, queue_id = %self.queue_id, "queue length unavailable");
                0
            }
        }
    }
}

#[inline]
fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let micros = (to - from).num_microseconds().unwrap_or(i64::MAX);
    (micros as f64 / 1_000_000.0).max(0.0)
}

/// Round to millisecond precision for reporting.
#[inline]
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use karpix_job_queue::{async_trait, JobQueueError};

    struct FixedDepth(Result<u64, ()>);

    #[async_trait]
    impl QueueInspector for FixedDepth {
        async fn queue_length(&self) -> Result<u64, JobQueueError> {
            self.0.map_err(|_| JobQueueError::NotFound("queue".into()))
        }
    }

    #[test]
    fn unknown_enqueue_time_means_zero_wait() {
        let ctx = ExecutionContext::detached();
        assert_eq!(ctx.queue_id, "rq");
        assert_eq!(ctx.queue_time(), 0.0);
    }

    #[test]
    fn wait_is_measured_and_clamped() {
        let start = Utc::now();
        let ctx = ExecutionContext::detached()
            .with_started_at(start)
            .with_enqueued_at(Some(start - Duration::milliseconds(1500)));
        assert_eq!(round3(ctx.queue_time()), 1.5);
        assert_eq!(round3(ctx.total_time(start + Duration::seconds(2))), 3.5);

        // enqueue stamped by a clock running ahead of ours
        let skewed = ctx.with_enqueued_at(Some(start + Duration::seconds(5)));
        assert_eq!(skewed.queue_time(), 0.0);
    }

    #[test]
    fn rounding() {
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(2.0006), 2.001);
    }

    #[tokio::test]
    async fn queue_length_is_best_effort() {
        assert_eq!(ExecutionContext::detached().queue_length().await, 0);

        let mut ctx = ExecutionContext::detached();
        ctx.inspector = Some(Arc::new(FixedDepth(Ok(7))));
        assert_eq!(ctx.queue_length().await, 7);

        ctx.inspector = Some(Arc::new(FixedDepth(Err(()))));
        assert_eq!(ctx.queue_length().await, 0);
    }
}
