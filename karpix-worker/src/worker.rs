//! Poll loop that claims jobs from a queue and runs them.

use std::sync::Arc;
use std::time::Duration;

use karpix_job_queue::{JobQueueError, QueueBackend, QueueInspector, QueuedJob};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::context::ExecutionContext;
use crate::envelope::ResponseEnvelope;
use crate::runner::TaskRunner;

/// Upper bound for the delay between retries after a queue error.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Queue operations that failed and were retried or abandoned.
    pub queue_errors: u64,
}

/// Consumes one queue until shutdown (or until it is empty, in burst mode).
pub struct Worker<Q> {
    runner: TaskRunner,
    queue: Arc<Q>,
    poll_interval: Duration,
    burst: bool,
}

impl<Q> Worker<Q>
where
    Q: QueueBackend + 'static,
{
    pub fn new(runner: TaskRunner, queue: Arc<Q>) -> Self {
        Self {
            runner,
            queue,
            poll_interval: Duration::from_secs(1),
            burst: false,
        }
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Exit as soon as the queue has nothing left to claim.
    #[must_use]
    pub fn burst(mut self, burst: bool) -> Self {
        self.burst = burst;
        self
    }

    /// Run until `shutdown` flips to `true` (or, in burst mode, the queue drains).
    ///
    /// A job that has been claimed always runs to completion before the
    /// shutdown signal is honoured. Queue errors are logged and retried after
    /// a delay that starts at the poll interval and doubles up to [`MAX_BACKOFF`].
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let mut backoff = Backoff::new(self.poll_interval);
        info!(
            queue = self.queue.queue_name(),
            burst = self.burst,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "worker started"
        );

        loop {
            if *shutdown.borrow() {
                info!("shutdown requested");
                break;
            }

            match self.queue.claim().await {
                Ok(Some(job)) => {
                    backoff.reset();
                    let outcome = self.process(&job).await;
                    stats.processed += 1;
                    if outcome.succeeded {
                        stats.succeeded += 1;
                    } else {
                        stats.failed += 1;
                    }
                    if let Err(err) = outcome.settled {
                        stats.queue_errors += 1;
                        error!(job_id = %job.descriptor.job_id, error = %err, "failed to settle job");
                        let delay = backoff.next_delay();
                        self.pause(&mut shutdown, delay).await;
                    }
                }
                Ok(None) if self.burst => {
                    debug!("queue drained");
                    break;
                }
                Ok(None) => {
                    backoff.reset();
                    self.pause(&mut shutdown, self.poll_interval).await;
                }
                Err(err) => {
                    stats.queue_errors += 1;
                    let delay = backoff.next_delay();
                    error!(
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "failed to claim job"
                    );
                    self.pause(&mut shutdown, delay).await;
                }
            }
        }

        info!(
            processed = stats.processed,
            succeeded = stats.succeeded,
            failed = stats.failed,
            queue_errors = stats.queue_errors,
            "worker stopped"
        );
        stats
    }

    /// Sleep for `delay`, returning early when shutdown is requested.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                // sender gone: nobody can ask us to stop any more
                if changed.is_err() && !*shutdown.borrow() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Run one claimed job and settle it on the queue.
    async fn process(&self, job: &QueuedJob) -> Outcome {
        let inspector = Arc::clone(&self.queue) as Arc<dyn QueueInspector>;
        let ctx = ExecutionContext::for_job(job, inspector);

        match self.runner.run(&job.descriptor, &ctx).await {
            Ok(envelope) => {
                let result = ResponseEnvelope::from(envelope).to_value();
                Outcome {
                    succeeded: true,
                    settled: self.queue.finish(job, &result).await,
                }
            }
            Err(err) => {
                error!(job_id = %job.descriptor.job_id, error = %err, "job raised");
                Outcome {
                    succeeded: false,
                    settled: self.queue.fail(job, &err.to_string()).await,
                }
            }
        }
    }
}

struct Outcome {
    succeeded: bool,
    settled: Result<(), JobQueueError>,
}

/// Doubling retry delay, capped at [`MAX_BACKOFF`].
#[derive(Debug, Clone, Copy)]
struct Backoff {
    base: Duration,
    current: Duration,
}

impl Backoff {
    fn new(base: Duration) -> Self {
        let base = base.min(MAX_BACKOFF);
        Self {
            base,
            current: base,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(MAX_BACKOFF);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}
