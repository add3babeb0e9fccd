use std::sync::Arc;
use std::time::Duration;

use karpix_config::Config;
use karpix_status_log::{FileStatusLogger, StatusLogger, TracingStatusLogger};
use karpix_webhook::{HttpWebhookNotifier, NotificationError};

/// Build the status logger: one JSON file per job when a directory is
/// configured, tracing events otherwise.
pub fn status_logger_from_config(cfg: &Config) -> Arc<dyn StatusLogger> {
    match &cfg.status_log.directory {
        Some(dir) => {
            tracing::info!(directory = %dir, "recording job statuses to files");
            Arc::new(FileStatusLogger::new(dir))
        }
        None => Arc::new(TracingStatusLogger),
    }
}

/// Build the webhook notifier from the `webhook` section.
pub fn notifier_from_config(cfg: &Config) -> Result<HttpWebhookNotifier, NotificationError> {
    HttpWebhookNotifier::new(
        Duration::from_secs(cfg.webhook.timeout_secs),
        cfg.webhook.user_agent.as_deref(),
    )
}

/// Poll interval from the `worker` section.
pub fn poll_interval_from_config(cfg: &Config) -> Duration {
    Duration::from_millis(cfg.worker.poll_interval_ms)
}
