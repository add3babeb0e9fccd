//! Job descriptors, handler registry and Redis queue adapter.
//!
//! A job names its handler by a `(module, qualname)` pair. Handlers are
//! registered explicitly at startup and resolved per job; nothing is looked up
//! reflectively.
//!
//! # Architecture
//!
//! - [`JobDescriptor`] - A unit of work as stored on the queue
//! - [`JobHandler`] - Trait for implementing handlers
//! - [`HandlerRegistry`] - Resolves `(module, qualname)` to a handler
//! - [`QueueBackend`] - What a worker needs from a queue
//! - [`RedisQueue`] - Enqueue, claim and settle jobs in Redis
//! - [`MemoryQueue`] - Process-local queue for tests and local runs
//!
//! # Example
//!
//! ```rust,no_run
//! use karpix_job_queue::{
//!     async_trait, HandlerCall, HandlerError, HandlerKey, HandlerRegistry, HandlerResponse,
//!     JobHandler,
//! };
//!
//! struct Ping;
//!
//! #[async_trait]
//! impl JobHandler for Ping {
//!     fn key(&self) -> HandlerKey {
//!         HandlerKey::new("diagnostics", "ping")
//!     }
//!
//!     async fn handle(&self, _call: HandlerCall) -> Result<HandlerResponse, HandlerError> {
//!         Ok(HandlerResponse::ok("pong", "/v1/diagnostics/ping"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = HandlerRegistry::new();
//!     registry.register(Ping).await;
//!     let handler = registry.resolve("diagnostics", "ping").await.unwrap();
//!     println!("resolved {}", handler.key());
//! }
//! ```

mod backend;
mod error;
mod handler;
mod redis_queue;
mod registry;
mod types;

pub use backend::{MemoryQueue, QueueBackend, SettledJob};
pub use error::{HandlerError, JobQueueError, ResolutionError};
pub use handler::{handler_fn, FnHandler, HandlerKey, JobHandler};
pub use redis_queue::{parse_job_hash, QueueInspector, QueueKeys, RedisQueue};
pub use registry::HandlerRegistry;
pub use types::{
    EnqueueResult, HandlerCall, HandlerResponse, JobData, JobDescriptor, QueueJobStatus,
    QueuedJob, RESERVED_KWARGS,
};

// Re-export async_trait for convenience when implementing JobHandler
pub use async_trait::async_trait;
