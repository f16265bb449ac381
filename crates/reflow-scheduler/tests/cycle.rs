// End-to-end evaluation cycles against a scripted registry: dedupe across
// overlapping windows, per-task failure isolation, and cycle abort semantics.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reflow_core::TaskDefinition;
use reflow_scheduler::{
    ChangeDetector, DedupeRegistry, MemoryStore, RegistryError, SchedulingDriver, SnapshotStore,
    TaskRegistry,
};
use tokio::sync::mpsc;

struct ScriptedRegistry {
    responses: Mutex<Vec<Result<Vec<TaskDefinition>, String>>>,
}

impl ScriptedRegistry {
    fn new(responses: Vec<Result<Vec<TaskDefinition>, String>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }

    fn always(tasks: Vec<TaskDefinition>) -> Self {
        Self::new(vec![Ok(tasks); 8])
    }
}

#[async_trait]
impl TaskRegistry for ScriptedRegistry {
    async fn list_tasks(&self) -> Result<Vec<TaskDefinition>, RegistryError> {
        let mut responses = self.responses.lock().unwrap();
        match responses.remove(0) {
            Ok(tasks) => Ok(tasks),
            Err(msg) => Err(RegistryError(msg)),
        }
    }
}

fn task(id: i64, name: &str, cron: &str) -> TaskDefinition {
    TaskDefinition {
        id,
        name: name.into(),
        cron: Some(cron.into()),
    }
}

fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 7, h, m, s).unwrap()
}

fn driver_with(
    registry: ScriptedRegistry,
    store: Arc<MemoryStore>,
    channel_capacity: usize,
) -> (
    SchedulingDriver<Arc<MemoryStore>>,
    mpsc::Receiver<reflow_core::FireEvent>,
) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let driver = SchedulingDriver::new(
        Arc::new(registry),
        ChangeDetector::new(store),
        DedupeRegistry::new(Duration::seconds(600)),
        Duration::seconds(60),
        tx,
    );
    (driver, rx)
}

#[tokio::test]
async fn due_task_fires_with_nominal_time() {
    let registry = ScriptedRegistry::always(vec![task(7, "morning-risk", "0 9 * * *")]);
    let (driver, mut rx) = driver_with(registry, Arc::new(MemoryStore::new()), 8);

    let outcome = driver.run_cycle(at(9, 0, 0)).await.unwrap();

    assert_eq!(outcome.dispatched.len(), 1);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.task_id, 7);
    assert_eq!(event.fire_time, at(9, 0, 0));
    assert_eq!(event.dedupe_key, format!("report_7_{}", at(9, 0, 0).timestamp()));
}

#[tokio::test]
async fn overlapping_windows_dispatch_once() {
    let registry = ScriptedRegistry::always(vec![task(7, "morning-risk", "0 9 * * *")]);
    let (driver, mut rx) = driver_with(registry, Arc::new(MemoryStore::new()), 8);

    // The 09:00 firing is inside both windows; only the first cycle wins.
    let first = driver.run_cycle(at(9, 0, 0)).await.unwrap();
    let second = driver.run_cycle(at(9, 0, 30)).await.unwrap();

    assert_eq!(first.dispatched.len(), 1);
    assert!(second.dispatched.is_empty());
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn registry_failure_aborts_cycle_and_keeps_snapshot() {
    let store = Arc::new(MemoryStore::new());
    let registry = ScriptedRegistry::new(vec![
        Ok(vec![task(1, "X", "0 9 * * *")]),
        Err("connection refused".into()),
    ]);
    let (driver, _rx) = driver_with(registry, store.clone(), 8);

    driver.run_cycle(at(8, 0, 0)).await.unwrap();
    let before = store.load().unwrap().unwrap();

    let err = driver.run_cycle(at(8, 1, 0)).await.unwrap_err();
    assert!(err.to_string().contains("registry unavailable"));

    // Unavailability must never read as "all tasks were removed".
    let after = store.load().unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn invalid_cron_skips_only_that_task() {
    let registry = ScriptedRegistry::always(vec![
        task(1, "broken", "whenever"),
        task(2, "every-minute", "* * * * *"),
    ]);
    let (driver, mut rx) = driver_with(registry, Arc::new(MemoryStore::new()), 8);

    let outcome = driver.run_cycle(at(9, 0, 0)).await.unwrap();

    assert_eq!(outcome.skipped_invalid, 1);
    assert_eq!(outcome.dispatched.len(), 1);
    assert_eq!(rx.try_recv().unwrap().task_id, 2);
}

#[tokio::test]
async fn failed_hand_off_retries_next_cycle() {
    let registry = ScriptedRegistry::always(vec![
        task(1, "a", "* * * * *"),
        task(2, "b", "* * * * *"),
    ]);
    // Capacity 1: the second firing's hand-off fails and must be released.
    let (driver, mut rx) = driver_with(registry, Arc::new(MemoryStore::new()), 1);

    let first = driver.run_cycle(at(9, 0, 0)).await.unwrap();
    assert_eq!(first.dispatched.len(), 1);

    // Drain the channel, rerun inside the same window: the deferred firing
    // goes out now, the already-dispatched one stays deduped.
    let delivered = rx.try_recv().unwrap();
    let second = driver.run_cycle(at(9, 0, 10)).await.unwrap();
    assert_eq!(second.dispatched.len(), 1);
    assert_ne!(second.dispatched[0].task_id, delivered.task_id);
}

#[tokio::test]
async fn cycle_reports_changes_between_discoveries() {
    let store = Arc::new(MemoryStore::new());
    let registry = ScriptedRegistry::new(vec![
        Ok(vec![task(1, "X", "0 9 * * *")]),
        Ok(vec![task(1, "Y", "0 9 * * *"), task(2, "Z", "0 10 * * *")]),
    ]);
    let (driver, _rx) = driver_with(registry, store, 8);

    driver.run_cycle(at(7, 0, 0)).await.unwrap();
    let outcome = driver.run_cycle(at(7, 1, 0)).await.unwrap();

    assert_eq!(outcome.changes.added.len(), 1);
    assert_eq!(outcome.changes.renamed.len(), 1);
    assert!(outcome.changes.disruptive());
}
