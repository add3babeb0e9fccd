use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StatusLogError;
use crate::record::StatusRecord;

/// Sink for job status transitions.
///
/// Implementations own retention; callers only append.
#[async_trait]
pub trait StatusLogger: Send + Sync {
    async fn record(&self, job_id: &str, record: &StatusRecord) -> Result<(), StatusLogError>;
}

/// Emits every record as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusLogger;

#[async_trait]
impl StatusLogger for TracingStatusLogger {
    async fn record(&self, job_id: &str, record: &StatusRecord) -> Result<(), StatusLogError> {
        let response = match &record.response {
            Some(value) => serde_json::to_string(value)?,
            None => "null".to_owned(),
        };
        tracing::info!(
            target: "karpix::job_status",
            job_id,
            job_status = %record.job_status,
            queue_id = %record.queue_id,
            process_id = record.process_id,
            %response,
            "job status"
        );
        Ok(())
    }
}

/// In-memory append-only log.
#[derive(Debug, Default, Clone)]
pub struct MemoryStatusLogger {
    entries: Arc<RwLock<Vec<(String, StatusRecord)>>>,
}

impl MemoryStatusLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in the order they were appended.
    pub async fn entries(&self) -> Vec<(String, StatusRecord)> {
        self.entries.read().await.clone()
    }

    /// Records appended for a single job.
    pub async fn records_for(&self, job_id: &str) -> Vec<StatusRecord> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(id, _)| id == job_id)
            .map(|(_, record)| record.clone())
            .collect()
    }
}

#[async_trait]
impl StatusLogger for MemoryStatusLogger {
    async fn record(&self, job_id: &str, record: &StatusRecord) -> Result<(), StatusLogError> {
        let mut entries = self.entries.write().await;
        entries.push((job_id.to_owned(), record.clone()));
        Ok(())
    }
}
