//! Redis-backed queue adapter.
//!
//! Layout for queue `q` under prefix `p`:
//!
//! ```text
//! p:queue:q               list   pending job ids (LPUSH in, LMOVE out)
//! p:queue:q:processing    list   ids claimed by a worker
//! p:job:<id>              hash   descriptor, origin, status, timestamps, result
//! p:finished:q            zset   finished ids scored by end time
//! p:failed:q              zset   failed ids scored by end time
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;

use crate::backend::QueueBackend;
use crate::error::JobQueueError;
use crate::types::{EnqueueResult, JobDescriptor, QueueJobStatus, QueuedJob};

const FIELD_DESCRIPTOR: &str = "descriptor";
const FIELD_ORIGIN: &str = "origin";
const FIELD_STATUS: &str = "status";
const FIELD_ENQUEUED_AT: &str = "enqueued_at";
const FIELD_STARTED_AT: &str = "started_at";
const FIELD_ENDED_AT: &str = "ended_at";
const FIELD_RESULT: &str = "result";
const FIELD_EXC_INFO: &str = "exc_info";

/// Read-only view of queue depth, used for best-effort reporting.
#[async_trait]
pub trait QueueInspector: Send + Sync {
    async fn queue_length(&self) -> Result<u64, JobQueueError>;
}

/// Redis key names for one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    prefix: String,
    queue: String,
}

impl QueueKeys {
    pub fn new(prefix: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            queue: queue.into(),
        }
    }

    #[inline]
    pub fn queue_name(&self) -> &str {
        &self.queue
    }

    pub fn pending(&self) -> String {
        format!("{}:queue:{}", self.prefix, self.queue)
    }

    pub fn processing(&self) -> String {
        format!("{}:queue:{}:processing", self.prefix, self.queue)
    }

    pub fn job(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    pub fn finished(&self) -> String {
        format!("{}:finished:{}", self.prefix, self.queue)
    }

    pub fn failed(&self) -> String {
        format!("{}:failed:{}", self.prefix, self.queue)
    }
}

/// Rebuild a claimed job from its stored hash.
pub fn parse_job_hash(
    job_id: &str,
    fields: &HashMap<String, String>,
    default_origin: &str,
) -> Result<QueuedJob, JobQueueError> {
    let raw = fields
        .get(FIELD_DESCRIPTOR)
        .ok_or_else(|| JobQueueError::Malformed {
            job_id: job_id.to_owned(),
            reason: "missing descriptor".into(),
        })?;
    let mut descriptor: JobDescriptor =
        serde_json::from_str(raw).map_err(|e| JobQueueError::Malformed {
            job_id: job_id.to_owned(),
            reason: e.to_string(),
        })?;
    if descriptor.job_id.is_empty() {
        descriptor.job_id = job_id.to_owned();
    } else if descriptor.job_id != job_id {
        return Err(JobQueueError::Malformed {
            job_id: job_id.to_owned(),
            reason: format!("descriptor names job {}", descriptor.job_id),
        });
    }

    let origin = fields
        .get(FIELD_ORIGIN)
        .filter(|o| !o.is_empty())
        .cloned()
        .unwrap_or_else(|| default_origin.to_owned());

    // An unreadable timestamp degrades to "unknown" rather than failing the job.
    let enqueued_at = fields
        .get(FIELD_ENQUEUED_AT)
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Ok(QueuedJob {
        descriptor,
        origin,
        enqueued_at,
    })
}

/// Queue adapter over a single managed Redis connection.
///
/// The connection is re-established in the background after a drop; commands
/// issued while it is down fail with [`JobQueueError::Unavailable`].
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    keys: QueueKeys,
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue")
            .field("conn", &"<ConnectionManager>")
            .field("keys", &self.keys)
            .finish()
    }
}

impl RedisQueue {
    /// Open a connection and bind to one queue.
    pub async fn connect(
        url: &str,
        prefix: impl Into<String>,
        queue: impl Into<String>,
    ) -> Result<Self, JobQueueError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            keys: QueueKeys::new(prefix, queue),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.keys.queue_name()
    }

    #[inline]
    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    /// Store the descriptor and push its id onto the pending list.
    pub async fn enqueue(&self, descriptor: JobDescriptor) -> Result<EnqueueResult, JobQueueError> {
        let mut descriptor = descriptor;
        let job_id = descriptor.ensure_job_id().to_owned();
        let body = serde_json::to_string(&descriptor)?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(
                self.keys.job(&job_id),
                &[
                    (FIELD_DESCRIPTOR, body),
                    (FIELD_ORIGIN, self.keys.queue_name().to_owned()),
                    (FIELD_STATUS, QueueJobStatus::Queued.as_str().to_owned()),
                    (FIELD_ENQUEUED_AT, now),
                ],
            )
            .ignore()
            .lpush(self.keys.pending(), &job_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        tracing::debug!(job_id = %job_id, queue = %self.name(), "job enqueued");
        Ok(EnqueueResult { job_id })
    }

    /// Claim the oldest pending job, if any.
    ///
    /// The id moves atomically to the processing list. Ids whose hash is
    /// missing or unreadable are moved to the failed registry with the reason
    /// in `exc_info` and skipped. Such jobs never reach a handler, so no status
    /// record is written and no webhook is sent for them.
    pub async fn claim(&self) -> Result<Option<QueuedJob>, JobQueueError> {
        let mut conn = self.conn.clone();
        loop {
            let job_id: Option<String> = redis::cmd("LMOVE")
                .arg(self.keys.pending())
                .arg(self.keys.processing())
                .arg("RIGHT")
                .arg("LEFT")
                .query_async(&mut conn)
                .await?;
            let Some(job_id) = job_id else {
                return Ok(None);
            };

            let fields: HashMap<String, String> = conn.hgetall(self.keys.job(&job_id)).await?;
            if fields.is_empty() {
                tracing::warn!(job_id = %job_id, "claimed job has no stored data; discarding");
                self.settle(&job_id, QueueJobStatus::Failed, FIELD_EXC_INFO, "job data missing")
                    .await?;
                continue;
            }

            match parse_job_hash(&job_id, &fields, self.name()) {
                Ok(job) => {
                    let _: () = conn
                        .hset_multiple(
                            self.keys.job(&job_id),
                            &[
                                (FIELD_STATUS, QueueJobStatus::Started.as_str().to_owned()),
                                (FIELD_STARTED_AT, Utc::now().to_rfc3339()),
                            ],
                        )
                        .await?;
                    return Ok(Some(job));
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "claimed job is malformed; discarding");
                    self.settle(&job_id, QueueJobStatus::Failed, FIELD_EXC_INFO, &e.to_string())
                        .await?;
                }
            }
        }
    }

    /// Record a successful result and move the job to the finished registry.
    pub async fn finish(&self, job: &QueuedJob, result: &Value) -> Result<(), JobQueueError> {
        let body = serde_json::to_string(result)?;
        self.settle(&job.descriptor.job_id, QueueJobStatus::Finished, FIELD_RESULT, &body)
            .await
    }

    /// Record a failure and move the job to the failed registry.
    pub async fn fail(&self, job: &QueuedJob, error: &str) -> Result<(), JobQueueError> {
        self.settle(&job.descriptor.job_id, QueueJobStatus::Failed, FIELD_EXC_INFO, error)
            .await
    }

    async fn settle(
        &self,
        job_id: &str,
        status: QueueJobStatus,
        field: &str,
        value: &str,
    ) -> Result<(), JobQueueError> {
        debug_assert!(status.is_terminal());
        let now = Utc::now();
        let registry = match status {
            QueueJobStatus::Finished => self.keys.finished(),
            _ => self.keys.failed(),
        };

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .hset_multiple(
                self.keys.job(job_id),
                &[
                    (FIELD_STATUS, status.as_str().to_owned()),
                    (FIELD_ENDED_AT, now.to_rfc3339()),
                    (field, value.to_owned()),
                ],
            )
            .ignore()
            .lrem(self.keys.processing(), 1, job_id)
            .ignore()
            .zadd(registry, job_id, now.timestamp())
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Number of pending jobs.
    pub async fn len(&self) -> Result<u64, JobQueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.llen(self.keys.pending()).await?)
    }

    pub async fn is_empty(&self) -> Result<bool, JobQueueError> {
        Ok(self.len().await? == 0)
    }

    /// Return ids left in the processing list by a worker that died mid-job
    /// to the pending list. Returns how many were moved.
    pub async fn requeue_orphans(&self) -> Result<u64, JobQueueError> {
        let mut conn = self.conn.clone();
        let mut moved = 0u64;
        loop {
            let job_id: Option<String> = redis::cmd("LMOVE")
                .arg(self.keys.processing())
                .arg(self.keys.pending())
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;
            match job_id {
                Some(job_id) => {
                    let _: () = conn
                        .hset(
                            self.keys.job(&job_id),
                            FIELD_STATUS,
                            QueueJobStatus::Queued.as_str(),
                        )
                        .await?;
                    moved += 1;
                }
                None => return Ok(moved),
            }
        }
    }
}

#[async_trait]
impl QueueInspector for RedisQueue {
    async fn queue_length(&self) -> Result<u64, JobQueueError> {
        self.len().await
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    fn queue_name(&self) -> &str {
        self.name()
    }

    async fn claim(&self) -> Result<Option<QueuedJob>, JobQueueError> {
        RedisQueue::claim(self).await
    }

    async fn finish(&self, job: &QueuedJob, result: &Value) -> Result<(), JobQueueError> {
        RedisQueue::finish(self, job, result).await
    }

    async fn fail(&self, job: &QueuedJob, error: &str) -> Result<(), JobQueueError> {
        RedisQueue::fail(self, job, error).await
    }
}
