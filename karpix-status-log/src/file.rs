use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StatusLogError;
use crate::logger::StatusLogger;
use crate::record::StatusRecord;

/// Keeps the latest status of each job in `<dir>/<job_id>.json`.
#[derive(Debug, Clone)]
pub struct FileStatusLogger {
    directory: PathBuf,
}

impl FileStatusLogger {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    #[inline]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Read back the latest record stored for a job, if any.
    pub async fn read(&self, job_id: &str) -> Result<Option<StatusRecord>, StatusLogError> {
        let path = self.record_path(job_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn record_path(&self, job_id: &str) -> Result<PathBuf, StatusLogError> {
        if job_id.is_empty()
            || job_id.contains(['/', '\\', '\0'])
            || job_id == "."
            || job_id.contains("..")
        {
            return Err(StatusLogError::InvalidJobId(job_id.to_owned()));
        }
        Ok(self.directory.join(format!("{job_id}.json")))
    }
}

#[async_trait]
impl StatusLogger for FileStatusLogger {
    async fn record(&self, job_id: &str, record: &StatusRecord) -> Result<(), StatusLogError> {
        let path = self.record_path(job_id)?;
        let body = serde_json::to_vec_pretty(record)?;

        tokio::fs::create_dir_all(&self.directory).await?;

        // Readers never observe a half-written file.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(job_id, status = %record.job_status, path = %path.display(), "status recorded");
        Ok(())
    }
}
