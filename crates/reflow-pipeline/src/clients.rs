//! Collaborator seams for the job pipeline. Network implementations live in
//! [`crate::http`]; tests script these traits directly.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

/// Transport-level failure talking to a remote collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Status payload from the execution service. The raw vocabulary is the
/// remote's own; the runner maps it to the local terminal set.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// Downstream execution service that actually runs report jobs.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Submit a job, returning the remote job id.
    async fn submit(&self, payload: &serde_json::Value) -> Result<String, ClientError>;

    /// Query current remote status.
    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, ClientError>;

    /// Download the finished job's result payload.
    async fn fetch_result(&self, job_id: &str) -> Result<Vec<u8>, ClientError>;
}

/// Result sink for completed jobs.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist `bytes` under `name`; returns the stored location.
    async fn store(&self, bytes: &[u8], name: &str) -> Result<String, ClientError>;
}

/// Audit trail for job runs, kept by the upstream registry service.
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Create a run record at submit time; returns the local record id.
    async fn create(&self, task_id: i64, external_job_id: &str) -> Result<i64, ClientError>;

    /// Refresh the record's status so observers see the latest known state.
    async fn update_status(&self, record_id: i64, status: &str) -> Result<(), ClientError>;

    /// Finalize the record with its terminal status and result location.
    async fn complete(
        &self,
        record_id: i64,
        status: &str,
        result_location: &str,
    ) -> Result<(), ClientError>;
}

/// Produces the payload submitted for one firing. The firing parameter is
/// the scheduled run date, not the evaluation instant.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn fetch_payload(
        &self,
        task_id: i64,
        run_date: NaiveDate,
    ) -> Result<serde_json::Value, ClientError>;
}
