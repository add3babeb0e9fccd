//! Webhook delivery of job response envelopes.
//!
//! A job may carry a `webhook_url`; once the job is done or failed the worker
//! POSTs the response envelope there as JSON. Delivery is a single attempt
//! bounded by a request timeout. Retries and signing are left to the receiver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while delivering a webhook.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The HTTP client could not be constructed.
    #[error("failed to build webhook client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request failed (network, DNS, timeout, invalid URL).
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The receiver answered with a non-2xx status.
    #[error("webhook returned HTTP {0}")]
    HttpStatus(u16),
}

/// Delivers a JSON payload to a caller-supplied URL.
#[async_trait]
pub trait WebhookNotifier: Send + Sync {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), NotificationError>;
}

/// reqwest-backed notifier.
#[derive(Debug, Clone)]
pub struct HttpWebhookNotifier {
    client: reqwest::Client,
}

impl HttpWebhookNotifier {
    /// Build a notifier with the given timeout and optional user agent override.
    pub fn new(timeout: Duration, user_agent: Option<&str>) -> Result<Self, NotificationError> {
        let user_agent = user_agent
            .map(str::to_owned)
            .unwrap_or_else(|| concat!("karpix-worker/", env!("CARGO_PKG_VERSION")).to_owned());
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(NotificationError::Client)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookNotifier for HttpWebhookNotifier {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), NotificationError> {
        tracing::debug!(url, "sending webhook");
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotificationError::HttpStatus(status.as_u16()));
        }
        tracing::debug!(url, status = status.as_u16(), "webhook delivered");
        Ok(())
    }
}

/// Records deliveries instead of sending them.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    calls: Arc<RwLock<Vec<(String, Value)>>>,
    fail_with: Option<u16>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recorder that still records each call but reports the given HTTP status as a failure.
    pub fn failing(status: u16) -> Self {
        Self {
            calls: Arc::default(),
            fail_with: Some(status),
        }
    }

    pub async fn calls(&self) -> Vec<(String, Value)> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl WebhookNotifier for RecordingNotifier {
    async fn notify(&self, url: &str, payload: &Value) -> Result<(), NotificationError> {
        self.calls
            .write()
            .await
            .push((url.to_owned(), payload.clone()));
        match self.fail_with {
            Some(status) => Err(NotificationError::HttpStatus(status)),
            None => Ok(()),
        }
    }
}
