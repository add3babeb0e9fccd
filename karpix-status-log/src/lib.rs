//! Job status recording for the Karpix worker.
//!
//! Every job execution produces exactly one `running` record followed by one
//! terminal record (`done` or `failed`). This crate defines that record and the
//! [`StatusLogger`] sinks that receive it.
//!
//! # Sinks
//!
//! - [`FileStatusLogger`] - keeps the latest record per job as `<dir>/<job_id>.json`
//! - [`TracingStatusLogger`] - emits records as structured tracing events
//! - [`MemoryStatusLogger`] - append-only in-memory log for tests and local runs
//!
//! # Example
//!
//! ```rust,no_run
//! use karpix_status_log::{FileStatusLogger, StatusLogger, StatusRecord};
//!
//! #[tokio::main]
//! async fn main() {
//!     let logger = FileStatusLogger::new("/var/lib/karpix/jobs");
//!     let record = StatusRecord::running("J1", "default", 4242);
//!     logger.record("J1", &record).await.unwrap();
//! }
//! ```

mod error;
mod file;
mod logger;
mod record;

pub use error::StatusLogError;
pub use file::FileStatusLogger;
pub use logger::{MemoryStatusLogger, StatusLogger, TracingStatusLogger};
pub use record::{JobStatus, StatusRecord};
