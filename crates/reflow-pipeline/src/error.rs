use thiserror::Error;

/// Exactly one of these (or success) results per firing. All are scoped to
/// the single firing they belong to and never abort sibling firings.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Network or remote rejection at submit time. No retry at this layer.
    #[error("job submission failed: {0}")]
    Submission(String),

    /// Transport failure during a status check. Distinct from the job
    /// itself failing; retried within the remaining attempt budget.
    #[error("status poll failed: {0}")]
    Polling(String),

    /// The remote service reported the job terminally failed.
    #[error("job {job_id} failed with remote status '{status}'")]
    JobFailed { job_id: String, status: String },

    /// The poll budget ran out before the job reached a terminal status.
    #[error("job {job_id} timed out after {attempts} poll attempts")]
    JobTimeout { job_id: String, attempts: u32 },

    /// Result download or persistence failed after the job completed. The
    /// remote job stays completed; only this firing is failed.
    #[error("result storage failed: {0}")]
    Storage(String),

    /// The run-record collaborator rejected the audit write.
    #[error("run record error: {0}")]
    Record(String),

    /// Shutdown was requested between poll attempts.
    #[error("firing cancelled by shutdown")]
    Cancelled,
}
