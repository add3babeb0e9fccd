//! Queue backend seam and an in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::JobQueueError;
use crate::redis_queue::QueueInspector;
use crate::types::{EnqueueResult, JobDescriptor, QueueJobStatus, QueuedJob};

/// The operations a worker needs from a queue.
///
/// Delivery guarantees, visibility and retention belong to the implementation.
#[async_trait]
pub trait QueueBackend: QueueInspector {
    /// Name of the queue this backend consumes.
    fn queue_name(&self) -> &str;

    /// Claim the next job, `None` when the queue is empty.
    async fn claim(&self) -> Result<Option<QueuedJob>, JobQueueError>;

    /// Record a job's result.
    async fn finish(&self, job: &QueuedJob, result: &Value) -> Result<(), JobQueueError>;

    /// Record a job's failure.
    async fn fail(&self, job: &QueuedJob, error: &str) -> Result<(), JobQueueError>;
}

/// Final state of a job settled by a [`MemoryQueue`].
#[derive(Debug, Clone, PartialEq)]
pub struct SettledJob {
    pub job: QueuedJob,
    pub status: QueueJobStatus,
    /// Result for finished jobs, error text for failed ones.
    pub outcome: Value,
}

#[derive(Debug, Default)]
struct MemoryQueueState {
    pending: VecDeque<QueuedJob>,
    started: HashMap<String, QueuedJob>,
    settled: Vec<SettledJob>,
}

/// Process-local queue for tests and local runs.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    name: String,
    state: Arc<Mutex<MemoryQueueState>>,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::default(),
        }
    }

    pub async fn enqueue(&self, descriptor: JobDescriptor) -> EnqueueResult {
        let mut descriptor = descriptor;
        let job_id = descriptor.ensure_job_id().to_owned();
        let job = QueuedJob {
            descriptor,
            origin: self.name.clone(),
            enqueued_at: Some(Utc::now()),
        };
        self.state.lock().await.pending.push_back(job);
        EnqueueResult { job_id }
    }

    /// Jobs settled so far, oldest first.
    pub async fn settled(&self) -> Vec<SettledJob> {
        self.state.lock().await.settled.clone()
    }

    /// Jobs claimed but not yet settled.
    pub async fn in_progress(&self) -> usize {
        self.state.lock().await.started.len()
    }

    async fn settle(
        &self,
        job: &QueuedJob,
        status: QueueJobStatus,
        outcome: Value,
    ) -> Result<(), JobQueueError> {
        let mut state = self.state.lock().await;
        let job = state
            .started
            .remove(&job.descriptor.job_id)
            .ok_or_else(|| JobQueueError::NotFound(job.descriptor.job_id.clone()))?;
        state.settled.push(SettledJob {
            job,
            status,
            outcome,
        });
        Ok(())
    }
}

#[async_trait]
impl QueueInspector for MemoryQueue {
    async fn queue_length(&self) -> Result<u64, JobQueueError> {
        Ok(self.state.lock().await.pending.len() as u64)
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn claim(&self) -> Result<Option<QueuedJob>, JobQueueError> {
        let mut state = self.state.lock().await;
        let Some(job) = state.pending.pop_front() else {
            return Ok(None);
        };
        state
            .started
            .insert(job.descriptor.job_id.clone(), job.clone());
        Ok(Some(job))
    }

    async fn finish(&self, job: &QueuedJob, result: &Value) -> Result<(), JobQueueError> {
        self.settle(job, QueueJobStatus::Finished, result.clone())
            .await
    }

    async fn fail(&self, job: &QueuedJob, error: &str) -> Result<(), JobQueueError> {
        self.settle(job, QueueJobStatus::Failed, Value::String(error.to_owned()))
            .await
    }
}
