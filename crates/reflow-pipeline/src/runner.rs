//! Job execution state machine: submit → poll until terminal → store result.

use std::sync::Arc;
use std::time::Duration;

use reflow_core::{FireEvent, JobRun, RunStatus};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clients::{ExecutionClient, ResultStore, RunRecorder};
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub max_poll_attempts: u32,
    pub poll_interval: Duration,
    pub result_prefix: String,
}

impl From<&reflow_core::config::PipelineConfig> for RunnerConfig {
    fn from(cfg: &reflow_core::config::PipelineConfig) -> Self {
        Self {
            max_poll_attempts: cfg.max_poll_attempts,
            poll_interval: Duration::from_secs(cfg.poll_interval_secs),
            result_prefix: cfg.result_prefix.clone(),
        }
    }
}

/// Drives one dispatched firing through the remote job lifecycle.
///
/// The poll loop blocks the worker running it for its full duration
/// (attempts × interval, potentially hours); the dispatch pool sizes its
/// worker bound around that. Cancellation is observed between attempts.
pub struct JobRunner {
    execution: Arc<dyn ExecutionClient>,
    records: Arc<dyn RunRecorder>,
    storage: Arc<dyn ResultStore>,
    config: RunnerConfig,
}

impl JobRunner {
    pub fn new(
        execution: Arc<dyn ExecutionClient>,
        records: Arc<dyn RunRecorder>,
        storage: Arc<dyn ResultStore>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            execution,
            records,
            storage,
            config,
        }
    }

    /// Run one firing to a terminal state. Ordering is strict: submit
    /// before any poll, every poll before finalize.
    pub async fn run(
        &self,
        event: &FireEvent,
        payload: &serde_json::Value,
        cancel: watch::Receiver<bool>,
    ) -> Result<JobRun, PipelineError> {
        let job_id = self
            .execution
            .submit(payload)
            .await
            .map_err(|e| PipelineError::Submission(e.to_string()))?;
        info!(task_id = event.task_id, %job_id, "submitted job to execution service");

        let mut run = JobRun::submitted(event.task_id, job_id.clone());

        let record_id = self
            .records
            .create(event.task_id, &job_id)
            .await
            .map_err(|e| {
                PipelineError::Record(format!("create failed for external job {job_id}: {e}"))
            })?;
        run.record_id = Some(record_id);

        self.poll_until_terminal(&mut run, record_id, cancel).await?;
        self.finalize(&mut run, record_id).await?;
        Ok(run)
    }

    /// Poll the remote job until `Completed`/`Failed` or the attempt budget
    /// runs out. Transport errors on individual polls consume an attempt
    /// and are retried; they are never read as the job having failed. After
    /// every successful poll the run record is refreshed so an observer
    /// sees the latest known status mid-poll.
    async fn poll_until_terminal(
        &self,
        run: &mut JobRun,
        record_id: i64,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<(), PipelineError> {
        let job_id = run.external_job_id.clone();
        let max = self.config.max_poll_attempts;

        for attempt in 1..=max {
            run.attempts = attempt;

            match self.execution.status(&job_id).await {
                Err(e) => {
                    let err = PipelineError::Polling(e.to_string());
                    warn!(%job_id, attempt, "{err}; retrying within budget");
                }
                Ok(remote) => {
                    let mapped = map_remote_status(&remote.status);
                    run.advance(mapped);
                    self.refresh_record(record_id, &run.status.to_string()).await;

                    match mapped {
                        RunStatus::Completed => {
                            info!(%job_id, attempt, "job completed remotely");
                            return Ok(());
                        }
                        RunStatus::Failed => {
                            info!(%job_id, attempt, remote_status = %remote.status, "job failed remotely");
                            return Err(PipelineError::JobFailed {
                                job_id,
                                status: remote.status,
                            });
                        }
                        _ => {
                            debug!(%job_id, attempt, remote_status = %remote.status, "job still running");
                        }
                    }
                }
            }

            if attempt < max {
                let sleep = tokio::time::sleep(self.config.poll_interval);
                tokio::pin!(sleep);
                loop {
                    tokio::select! {
                        _ = &mut sleep => break,
                        res = cancel.changed() => {
                            if *cancel.borrow() {
                                self.refresh_record(record_id, "cancelled").await;
                                return Err(PipelineError::Cancelled);
                            }
                            if res.is_err() {
                                // shutdown side is gone; nothing can cancel
                                // us anymore, so just sleep out the interval
                                sleep.as_mut().await;
                                break;
                            }
                        }
                    }
                }
            }
        }

        run.advance(RunStatus::TimedOut);
        self.refresh_record(record_id, "timed_out").await;
        Err(PipelineError::JobTimeout {
            job_id,
            attempts: max,
        })
    }

    /// Download the completed job's result and hand it to the storage
    /// collaborator. A failure here fails the firing but cannot revert the
    /// remote job's completed status.
    async fn finalize(&self, run: &mut JobRun, record_id: i64) -> Result<(), PipelineError> {
        let job_id = &run.external_job_id;
        let bytes = self
            .execution
            .fetch_result(job_id)
            .await
            .map_err(|e| PipelineError::Storage(format!("download of {job_id} failed: {e}")))?;

        let name = format!(
            "{}/{}/results_{}.json",
            self.config.result_prefix, run.task_id, job_id
        );
        let location = self
            .storage
            .store(&bytes, &name)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        if let Err(e) = self.records.complete(record_id, "completed", &location).await {
            // The result is durably stored; a stale audit row is not worth
            // failing the firing over.
            warn!(record_id, error = %e, "run record finalization failed");
        }

        info!(%job_id, %location, "results stored");
        run.result_location = Some(location);
        Ok(())
    }

    async fn refresh_record(&self, record_id: i64, status: &str) {
        if let Err(e) = self.records.update_status(record_id, status).await {
            warn!(record_id, status, error = %e, "run record refresh failed");
        }
    }
}

/// Map the remote vocabulary onto the local terminal set. Anything not
/// recognisably terminal counts as still running.
fn map_remote_status(raw: &str) -> RunStatus {
    match raw.to_ascii_lowercase().as_str() {
        "completed" | "finished" | "succeeded" => RunStatus::Completed,
        "failed" | "error" => RunStatus::Failed,
        _ => RunStatus::Running,
    }
}
