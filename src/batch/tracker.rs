//! Submit request fragments as remote jobs and follow them to a terminal state
//!
//! Once a job is observed terminal its record is never changed locally.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::batch::client::{BatchService, RemoteJob};
use crate::batch::fragment::split_if_needed;
use crate::batch::request::{BATCH_ENDPOINT, COMPLETION_WINDOW};
use crate::error::BatchError;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn from_remote(status: &str) -> Self {
        match status {
            "validating" => JobStatus::Pending,
            "in_progress" | "finalizing" | "cancelling" => JobStatus::Running,
            "completed" => JobStatus::Succeeded,
            "failed" | "expired" | "cancelled" => JobStatus::Failed,
            other => {
                warn!("unknown batch status `{}`, treating as pending", other);
                JobStatus::Pending
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    pub job_id: String,
    pub status: JobStatus,
    pub output_file_id: Option<String>,
    pub error_file_id: Option<String>,
    pub errors: Option<Value>,
}

impl From<RemoteJob> for BatchJob {
    fn from(job: RemoteJob) -> Self {
        Self {
            status: JobStatus::from_remote(&job.status),
            job_id: job.id,
            output_file_id: job.output_file_id,
            error_file_id: job.error_file_id,
            errors: job.errors,
        }
    }
}

impl BatchJob {
    fn error_text(&self) -> String {
        self.errors.as_ref().map(Value::to_string).unwrap_or_else(|| "no error details".to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    /// `None` polls forever
    pub max_polls: Option<u32>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60), max_polls: None }
    }
}

/// Local files a succeeded job was downloaded to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Downloaded {
    pub output: Option<PathBuf>,
    pub errors: Option<PathBuf>,
}

pub struct JobTracker<'a, S: ?Sized> {
    service: &'a S,
    poll: PollConfig,
}

impl<'a, S: BatchService + ?Sized> JobTracker<'a, S> {
    pub fn new(service: &'a S, poll: PollConfig) -> Self {
        Self { service, poll }
    }

    /// Upload one fragment and start a job over it
    pub async fn submit(&self, fragment: &Path) -> Result<String, BatchError> {
        let file_id = self.service.upload_file(fragment).await?;
        self.service.create_batch_job(&file_id, BATCH_ENDPOINT, COMPLETION_WINDOW).await
    }

    /// Split `input` if it exceeds `budget`, then submit every fragment in order
    pub async fn submit_all(&self, input: &Path, budget: u64) -> Result<Vec<String>, BatchError> {
        let fragments = split_if_needed(input, budget)?;
        let mut job_ids = Vec::with_capacity(fragments.len());
        for fragment in &fragments {
            job_ids.push(self.submit(fragment).await?);
        }
        info!("submitted {} jobs for {}", job_ids.len(), input.display());
        Ok(job_ids)
    }

    pub async fn poll_status(&self, job_id: &str) -> Result<BatchJob, BatchError> {
        Ok(self.service.retrieve_job(job_id).await?.into())
    }

    /// Poll at a fixed interval until the job is terminal
    pub async fn wait_terminal(&self, job_id: &str) -> Result<BatchJob, BatchError> {
        let mut polls = 0;
        loop {
            let job = self.poll_status(job_id).await?;
            polls += 1;
            if job.status.is_terminal() {
                info!("batch job {} finished: {}", job_id, job.status.label());
                metrics::inc_batch_job(job.status.label());
                return Ok(job);
            }
            if self.poll.max_polls.is_some_and(|max| polls >= max) {
                return Err(BatchError::PollExhausted { job_id: job_id.to_string(), polls });
            }
            info!("batch job {} is {}, next poll in {:?}", job_id, job.status.label(), self.poll.interval);
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Download the result and error files of a terminal job
    ///
    /// A failed job yields its remote error payload instead.
    pub async fn retrieve(
        &self,
        job: &BatchJob,
        output_path: &Path,
        error_path: &Path,
    ) -> Result<Downloaded, BatchError> {
        if job.status == JobStatus::Failed {
            return Err(BatchError::JobFailed { job_id: job.job_id.clone(), errors: job.error_text() });
        }
        let mut downloaded = Downloaded::default();
        if let Some(file_id) = &job.output_file_id {
            tokio::fs::write(output_path, self.service.download_file(file_id).await?).await?;
            info!("saved results of {} to {}", job.job_id, output_path.display());
            downloaded.output = Some(output_path.to_path_buf());
        }
        if let Some(file_id) = &job.error_file_id {
            tokio::fs::write(error_path, self.service.download_file(file_id).await?).await?;
            warn!("job {} has failed requests, saved to {}", job.job_id, error_path.display());
            downloaded.errors = Some(error_path.to_path_buf());
        }
        Ok(downloaded)
    }
}
