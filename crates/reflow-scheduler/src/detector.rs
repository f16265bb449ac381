//! Diffs successive task-definition snapshots and keeps the persisted
//! snapshot current.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use reflow_core::{ChangeReport, CronChange, NameChange, ScheduleSnapshot, TaskDefinition};
use tracing::{info, warn};

use crate::cron::parse_standard;
use crate::error::Result;
use crate::store::SnapshotStore;

/// Compares each discovery against the last persisted snapshot, then
/// replaces the snapshot (never merges).
pub struct ChangeDetector<S: SnapshotStore> {
    store: S,
}

impl<S: SnapshotStore> ChangeDetector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Classify additions, removals, and cron/name edits between the
    /// persisted snapshot and `new_defs`, persist `new_defs`, and return the
    /// report.
    ///
    /// Only schedulable tasks — those carrying a cron that parses — count
    /// toward add/remove accounting. A task with an unparsable cron degrades
    /// to "cron-less" with a logged warning; it never crashes the detector.
    /// The result is independent of the ordering of `new_defs`.
    pub fn detect(&self, new_defs: &[TaskDefinition], now: DateTime<Utc>) -> Result<ChangeReport> {
        let previous = self.store.load()?.unwrap_or_else(ScheduleSnapshot::empty);
        let new_by_id: HashMap<i64, &TaskDefinition> =
            new_defs.iter().map(|d| (d.id, d)).collect();

        let mut report = ChangeReport::default();

        for def in new_defs {
            match previous.tasks.get(&def.id) {
                None => {
                    if schedulable(def.id, def.cron.as_deref()) {
                        report.added.push(def.clone());
                    }
                }
                Some(old) => {
                    if old.cron != def.cron {
                        report.rescheduled.push(CronChange {
                            id: def.id,
                            name: def.name.clone(),
                            old_cron: old.cron.clone(),
                            new_cron: def.cron.clone(),
                        });
                    }
                    if old.name != def.name {
                        report.renamed.push(NameChange {
                            id: def.id,
                            old_name: old.name.clone(),
                            new_name: def.name.clone(),
                        });
                    }
                }
            }
        }

        for (id, old) in &previous.tasks {
            if !new_by_id.contains_key(id) && schedulable(*id, old.cron.as_deref()) {
                report.removed.push(TaskDefinition {
                    id: *id,
                    name: old.name.clone(),
                    cron: old.cron.clone(),
                });
            }
        }

        // Deterministic regardless of input ordering.
        report.added.sort_by_key(|d| d.id);
        report.removed.sort_by_key(|d| d.id);
        report.rescheduled.sort_by_key(|c| c.id);
        report.renamed.sort_by_key(|n| n.id);

        log_report(&report);
        self.store.save(&ScheduleSnapshot::capture(new_defs, now))?;

        Ok(report)
    }
}

fn schedulable(id: i64, cron: Option<&str>) -> bool {
    match cron {
        None => false,
        Some(expr) => match parse_standard(expr) {
            Ok(_) => true,
            Err(e) => {
                warn!(task_id = id, error = %e, "task has unparsable cron; treated as cron-less");
                false
            }
        },
    }
}

fn log_report(report: &ChangeReport) {
    for def in &report.added {
        info!(task_id = def.id, name = %def.name, "new schedulable task");
    }
    for def in &report.removed {
        info!(task_id = def.id, name = %def.name, "schedulable task removed");
    }
    for change in &report.rescheduled {
        info!(
            task_id = change.id,
            name = %change.name,
            old = change.old_cron.as_deref().unwrap_or("-"),
            new = change.new_cron.as_deref().unwrap_or("-"),
            "cron changed"
        );
    }
    for change in &report.renamed {
        info!(
            task_id = change.id,
            old = %change.old_name,
            new = %change.new_name,
            "task renamed"
        );
    }

    if report.disruptive() {
        warn!("{}", report.summary());
    } else if !report.is_empty() {
        info!("{}", report.summary());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn task(id: i64, name: &str, cron: Option<&str>) -> TaskDefinition {
        TaskDefinition {
            id,
            name: name.into(),
            cron: cron.map(String::from),
        }
    }

    fn detector() -> ChangeDetector<MemoryStore> {
        ChangeDetector::new(MemoryStore::new())
    }

    #[test]
    fn first_discovery_adds_everything_schedulable() {
        let d = detector();
        let defs = vec![
            task(1, "X", Some("0 9 * * *")),
            task(2, "no-cron", None),
        ];
        let report = d.detect(&defs, Utc::now()).unwrap();

        assert_eq!(report.added.len(), 1);
        assert_eq!(report.added[0].id, 1);
        assert!(report.disruptive());
    }

    #[test]
    fn add_and_rename_scenario() {
        // Snapshot A = {1: X @ 0 9}, snapshot B = {1: Y @ 0 9, 2: Z @ 0 10}
        // → added {2}, removed {}, renamed {1: X→Y}, disruptive.
        let d = detector();
        d.detect(&[task(1, "X", Some("0 9 * * *"))], Utc::now())
            .unwrap();

        let report = d
            .detect(
                &[
                    task(1, "Y", Some("0 9 * * *")),
                    task(2, "Z", Some("0 10 * * *")),
                ],
                Utc::now(),
            )
            .unwrap();

        assert_eq!(report.added.iter().map(|t| t.id).collect::<Vec<_>>(), [2]);
        assert!(report.removed.is_empty());
        assert!(report.rescheduled.is_empty());
        assert_eq!(report.renamed.len(), 1);
        assert_eq!(report.renamed[0].old_name, "X");
        assert_eq!(report.renamed[0].new_name, "Y");
        assert!(report.disruptive());
    }

    #[test]
    fn cron_and_name_edits_are_not_disruptive() {
        let d = detector();
        d.detect(&[task(1, "X", Some("0 9 * * *"))], Utc::now())
            .unwrap();
        let report = d
            .detect(&[task(1, "Y", Some("0 10 * * *"))], Utc::now())
            .unwrap();

        assert_eq!(report.rescheduled.len(), 1);
        assert_eq!(report.renamed.len(), 1);
        assert!(!report.disruptive());
    }

    #[test]
    fn both_edits_can_apply_to_the_same_id() {
        let d = detector();
        d.detect(&[task(1, "X", Some("0 9 * * *"))], Utc::now())
            .unwrap();
        let report = d
            .detect(&[task(1, "Y", Some("*/5 * * * *"))], Utc::now())
            .unwrap();
        assert_eq!(report.rescheduled[0].id, 1);
        assert_eq!(report.renamed[0].id, 1);
    }

    #[test]
    fn removal_counts_only_tasks_that_had_cron() {
        let d = detector();
        d.detect(
            &[task(1, "X", Some("0 9 * * *")), task(2, "no-cron", None)],
            Utc::now(),
        )
        .unwrap();
        let report = d.detect(&[], Utc::now()).unwrap();

        assert_eq!(report.removed.iter().map(|t| t.id).collect::<Vec<_>>(), [1]);
        assert!(report.disruptive());
    }

    #[test]
    fn unparsable_cron_degrades_to_cron_less() {
        let d = detector();
        let report = d
            .detect(&[task(1, "broken", Some("every tuesday"))], Utc::now())
            .unwrap();
        assert!(report.added.is_empty());
        assert!(!report.disruptive());
    }

    #[test]
    fn detect_is_order_independent() {
        let defs_forward = vec![
            task(1, "A", Some("0 9 * * *")),
            task(2, "B", Some("0 10 * * *")),
            task(3, "C", None),
        ];
        let mut defs_reversed = defs_forward.clone();
        defs_reversed.reverse();

        let d1 = detector();
        d1.detect(&[task(2, "old-B", Some("0 8 * * *"))], Utc::now())
            .unwrap();
        let r1 = d1.detect(&defs_forward, Utc::now()).unwrap();

        let d2 = detector();
        d2.detect(&[task(2, "old-B", Some("0 8 * * *"))], Utc::now())
            .unwrap();
        let r2 = d2.detect(&defs_reversed, Utc::now()).unwrap();

        assert_eq!(r1, r2);
    }

    #[test]
    fn snapshot_is_replaced_not_merged() {
        let d = detector();
        d.detect(&[task(1, "X", Some("0 9 * * *"))], Utc::now())
            .unwrap();
        d.detect(&[task(2, "Z", Some("0 10 * * *"))], Utc::now())
            .unwrap();

        let snapshot = d.store().load().unwrap().unwrap();
        assert!(!snapshot.tasks.contains_key(&1));
        assert!(snapshot.tasks.contains_key(&2));
    }

    #[test]
    fn no_changes_when_nothing_moved() {
        let d = detector();
        let defs = vec![task(1, "X", Some("0 9 * * *"))];
        d.detect(&defs, Utc::now()).unwrap();
        let report = d.detect(&defs, Utc::now()).unwrap();
        assert!(report.is_empty());
        assert!(!report.disruptive());
    }
}
