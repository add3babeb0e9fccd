//! Handler trait for implementing job handlers.

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::types::{HandlerCall, HandlerResponse};

/// The `(module, qualname)` pair a job names its handler by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerKey {
    pub module: String,
    pub qualname: String,
}

impl HandlerKey {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
        }
    }
}

impl fmt::Display for HandlerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.qualname)
    }
}

/// Trait for implementing job handlers.
///
/// Each handler answers to exactly one `(module, qualname)` pair and is
/// registered with a [`HandlerRegistry`](crate::HandlerRegistry) at startup.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The key jobs use to select this handler.
    fn key(&self) -> HandlerKey;

    /// Run the job.
    ///
    /// Returns the `(payload, endpoint, code)` response on return, or an error
    /// the worker reports as a failed job.
    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, HandlerError>;
}

/// Adapts an async closure into a [`JobHandler`].
pub struct FnHandler<F, Fut> {
    key: HandlerKey,
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnHandler<F, Fut>
where
    F: Fn(HandlerCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerResponse, HandlerError>> + Send,
{
    pub fn new(module: impl Into<String>, qualname: impl Into<String>, f: F) -> Self {
        Self {
            key: HandlerKey::new(module, qualname),
            f,
            _fut: PhantomData,
        }
    }
}

impl<F, Fut> fmt::Debug for FnHandler<F, Fut> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("key", &self.key)
            .field("f", &"<closure>")
            .finish()
    }
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F, Fut>
where
    F: Fn(HandlerCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerResponse, HandlerError>> + Send,
{
    fn key(&self) -> HandlerKey {
        self.key.clone()
    }

    async fn handle(&self, call: HandlerCall) -> Result<HandlerResponse, HandlerError> {
        (self.f)(call).await
    }
}

/// Shorthand for [`FnHandler::new`].
pub fn handler_fn<F, Fut>(module: impl Into<String>, qualname: impl Into<String>, f: F) -> FnHandler<F, Fut>
where
    F: Fn(HandlerCall) -> Fut + Send + Sync,
    Fut: Future<Output = Result<HandlerResponse, HandlerError>> + Send,
{
    FnHandler::new(module, qualname, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JobData, JobDescriptor};
    use serde_json::json;

    #[tokio::test]
    async fn closure_handler_runs() {
        let handler = handler_fn("m", "f", |call: HandlerCall| async move {
            Ok::<_, HandlerError>(HandlerResponse::ok(json!({ "job": call.job_id }), "/run"))
        });
        assert_eq!(handler.key(), HandlerKey::new("m", "f"));

        let call = JobDescriptor::new("m", "f", "J1", JobData::default())
            .to_call()
            .unwrap();
        let response = handler.handle(call).await.unwrap();
        assert_eq!(response.payload, json!({"job": "J1"}));
        assert_eq!(response.code, 200);
    }

    #[test]
    fn key_display() {
        assert_eq!(HandlerKey::new("services.media", "Convert.run").to_string(), "services.media:Convert.run");
    }
}
