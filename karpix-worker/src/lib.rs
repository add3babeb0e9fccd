//! Karpix worker runtime.
//!
//! Claims jobs from a queue, runs the registered handler for each one and
//! reports the outcome:
//!
//! - [`ExecutionContext`] - Per-job metadata (queue, pid, timings)
//! - [`TaskRunner`] - Resolve, invoke, record status, notify webhook
//! - [`Worker`] - Poll loop settling jobs on a [`QueueBackend`](karpix_job_queue::QueueBackend)
//! - [`ResponseEnvelope`] - The result shape written to the status log and webhook

pub mod context;
pub mod envelope;
pub mod runner;
pub mod worker;

pub use context::{ExecutionContext, DETACHED_QUEUE_ID};
pub use envelope::{CompletedEnvelope, FailedEnvelope, ResponseEnvelope, Timings};
pub use runner::TaskRunner;
pub use worker::{Worker, WorkerStats};
