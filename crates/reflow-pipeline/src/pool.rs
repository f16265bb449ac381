//! Bounded concurrent dispatch of fired events.

use std::sync::Arc;

use reflow_core::FireEvent;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::clients::PayloadSource;
use crate::runner::JobRunner;

/// Consumes fired events from the driver's channel and runs each firing on
/// its own task, bounded by a semaphore.
///
/// Each in-flight job blocks one worker for its whole poll loop, so the
/// bound is effectively "how many jobs may be in flight at the remote
/// service at once". No ordering exists between concurrent firings; errors
/// are contained per firing.
pub struct DispatchPool {
    runner: Arc<JobRunner>,
    payloads: Arc<dyn PayloadSource>,
    limit: Arc<Semaphore>,
}

impl DispatchPool {
    pub fn new(
        runner: Arc<JobRunner>,
        payloads: Arc<dyn PayloadSource>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            runner,
            payloads,
            limit: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Receive and run firings until the channel closes or `shutdown` flips
    /// true. The shutdown signal is also handed to every in-flight runner so
    /// multi-hour poll loops end between attempts, not at their budget.
    /// Resolves only once every in-flight runner has finished, so the caller
    /// can treat its completion as "all firings finalized".
    pub async fn run(self, mut rx: mpsc::Receiver<FireEvent>, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_concurrent = self.limit.available_permits(),
            "dispatch pool started"
        );

        let mut inflight = JoinSet::new();
        loop {
            let event = tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(event) => event,
                    None => break,
                },
                res = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("dispatch pool shutting down");
                        break;
                    }
                    if res.is_err() {
                        // shutdown side is gone; drain the channel plainly
                        match rx.recv().await {
                            Some(event) => event,
                            None => break,
                        }
                    } else {
                        continue;
                    }
                }
            };

            let permit = match self.limit.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let runner = self.runner.clone();
            let payloads = self.payloads.clone();
            let cancel = shutdown.clone();
            inflight.spawn(async move {
                let _permit = permit;
                run_one(runner, payloads, event, cancel).await;
            });
        }

        // In-flight runners see the same shutdown signal; wait for each to
        // end its poll loop and finalize its record before returning.
        if !inflight.is_empty() {
            info!(inflight = inflight.len(), "waiting for in-flight firings");
        }
        while inflight.join_next().await.is_some() {}
        info!("dispatch pool drained");
    }
}

async fn run_one(
    runner: Arc<JobRunner>,
    payloads: Arc<dyn PayloadSource>,
    event: FireEvent,
    cancel: watch::Receiver<bool>,
) {
    let payload = match payloads.fetch_payload(event.task_id, event.run_date()).await {
        Ok(payload) => payload,
        Err(e) => {
            error!(task_id = event.task_id, error = %e, "payload fetch failed; firing abandoned");
            return;
        }
    };

    match runner.run(&event, &payload, cancel).await {
        Ok(run) => {
            info!(
                task_id = event.task_id,
                job_id = %run.external_job_id,
                attempts = run.attempts,
                location = run.result_location.as_deref().unwrap_or("-"),
                "firing completed"
            );
        }
        Err(e) => {
            warn!(task_id = event.task_id, fire_time = %event.fire_time, "firing failed: {e}");
        }
    }
}
