//! Scheduling driver: one evaluation cycle end to end, plus the tick loop
//! that reruns it on the window cadence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reflow_core::{ChangeReport, FireEvent, TaskDefinition};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::cron::CronEvaluator;
use crate::dedupe::DedupeRegistry;
use crate::detector::ChangeDetector;
use crate::error::{Result, SchedulerError};
use crate::store::SnapshotStore;

/// Transport failure from the registry collaborator.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RegistryError(pub String);

/// Upstream task-definition registry, as the driver sees it.
#[async_trait]
pub trait TaskRegistry: Send + Sync {
    async fn list_tasks(&self) -> std::result::Result<Vec<TaskDefinition>, RegistryError>;
}

/// What one evaluation cycle did.
#[derive(Debug)]
pub struct CycleOutcome {
    pub changes: ChangeReport,
    pub dispatched: Vec<FireEvent>,
    /// Tasks skipped this cycle because their cron would not parse.
    pub skipped_invalid: usize,
}

/// Orchestrates one evaluation cycle: discovery → change detection → cron
/// evaluation → dedupe filter → hand-off.
///
/// Holds no long-lived state beyond the dedupe registry and the snapshot
/// store; it is safe to reconstruct between invocations as long as those two
/// are persisted (or the invocation cadence stays inside the dedupe
/// retention horizon).
pub struct SchedulingDriver<S: SnapshotStore> {
    registry: Arc<dyn TaskRegistry>,
    detector: ChangeDetector<S>,
    dedupe: DedupeRegistry,
    evaluator: CronEvaluator,
    fired_tx: mpsc::Sender<FireEvent>,
}

impl<S: SnapshotStore> SchedulingDriver<S> {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        detector: ChangeDetector<S>,
        dedupe: DedupeRegistry,
        window: Duration,
        fired_tx: mpsc::Sender<FireEvent>,
    ) -> Self {
        Self {
            registry,
            detector,
            dedupe,
            evaluator: CronEvaluator::new(window),
            fired_tx,
        }
    }

    /// Run one evaluation cycle at `now`.
    ///
    /// Only registry unavailability aborts the cycle (previous snapshot
    /// retained). Everything else — bad cron, failed hand-off — is contained
    /// to the task or firing it belongs to.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleOutcome> {
        let tasks = self
            .registry
            .list_tasks()
            .await
            .map_err(|e| SchedulerError::RegistryUnavailable(e.to_string()))?;

        let changes = self.detector.detect(&tasks, now)?;
        self.dedupe.prune(now);

        let mut dispatched = Vec::new();
        let mut skipped_invalid = 0;

        for task in &tasks {
            let Some(expr) = task.cron.as_deref() else {
                continue;
            };

            let due = match self.evaluator.due_at(expr, now) {
                Ok(due) => due,
                Err(e) => {
                    // Isolated per task: log and keep evaluating the rest.
                    warn!(task_id = task.id, name = %task.name, error = %e, "skipping task with invalid cron");
                    skipped_invalid += 1;
                    continue;
                }
            };

            let Some(fire_time) = due else {
                continue;
            };

            let event = FireEvent::new(task.id, fire_time);
            if !self.dedupe.claim(&event.dedupe_key) {
                // Already dispatched by an earlier overlapping window.
                continue;
            }

            match self.fired_tx.try_send(event.clone()) {
                Ok(()) => {
                    info!(
                        task_id = task.id,
                        name = %task.name,
                        fire_time = %fire_time,
                        key = %event.dedupe_key,
                        "dispatching due task"
                    );
                    dispatched.push(event);
                }
                Err(e) => {
                    // Release the claim so the firing recomputes as due next
                    // cycle instead of being silently lost.
                    self.dedupe.release(&event.dedupe_key);
                    warn!(
                        task_id = task.id,
                        key = %event.dedupe_key,
                        error = %SchedulerError::Dispatch(e.to_string()),
                        "hand-off failed; firing deferred to next cycle"
                    );
                }
            }
        }

        if !dispatched.is_empty() {
            info!(count = dispatched.len(), "triggered report runs");
        }

        Ok(CycleOutcome {
            changes,
            dispatched,
            skipped_invalid,
        })
    }

    /// Tick loop: one cycle per window length until `shutdown` flips true.
    /// Cycle errors are logged and the loop keeps going; the overlapping
    /// window design absorbs an occasional failed cycle.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(window_secs = self.evaluator.window().num_seconds(), "scheduling driver started");

        let period = self
            .evaluator
            .window()
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(60));
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle(Utc::now()).await {
                        error!("evaluation cycle failed: {e}");
                    }
                }
                res = shutdown.changed() => {
                    // a dropped sender also means the process is going down
                    if res.is_err() || *shutdown.borrow() {
                        info!("scheduling driver shutting down");
                        break;
                    }
                }
            }
        }
    }
}
