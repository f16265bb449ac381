use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One recurring report task as published by the upstream registry.
///
/// Identity is `id`; the registry may rename a task or edit its cron between
/// discovery cycles, but `id` is stable for the task's lifetime. A task
/// without a cron expression exists in the registry but is not schedulable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub cron: Option<String>,
}

/// Snapshot value for a single task: what we need to diff and to schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEntry {
    pub name: String,
    pub cron: Option<String>,
}

impl From<&TaskDefinition> for TaskEntry {
    fn from(def: &TaskDefinition) -> Self {
        Self {
            name: def.name.clone(),
            cron: def.cron.clone(),
        }
    }
}

/// The persisted picture of the task universe from the last successful
/// discovery. Wholly replaced on each discovery, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSnapshot {
    pub tasks: BTreeMap<i64, TaskEntry>,
    pub captured_at: DateTime<Utc>,
}

impl ScheduleSnapshot {
    pub fn empty() -> Self {
        Self {
            tasks: BTreeMap::new(),
            captured_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    pub fn capture(definitions: &[TaskDefinition], at: DateTime<Utc>) -> Self {
        Self {
            tasks: definitions
                .iter()
                .map(|d| (d.id, TaskEntry::from(d)))
                .collect(),
            captured_at: at,
        }
    }
}

/// A cron edit on a task present in both snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CronChange {
    pub id: i64,
    pub name: String,
    pub old_cron: Option<String>,
    pub new_cron: Option<String>,
}

/// A rename on a task present in both snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameChange {
    pub id: i64,
    pub old_name: String,
    pub new_name: String,
}

/// Structured diff between two consecutive schedule snapshots.
///
/// Add/remove accounting only counts schedulable tasks (those carrying a
/// parseable cron); cron and name edits are tracked independently and both
/// can apply to the same id in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeReport {
    pub added: Vec<TaskDefinition>,
    pub removed: Vec<TaskDefinition>,
    pub rescheduled: Vec<CronChange>,
    pub renamed: Vec<NameChange>,
}

impl ChangeReport {
    /// Adding or removing a schedulable task changes the set of executable
    /// pipelines; cron/name edits do not.
    pub fn disruptive(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.rescheduled.is_empty()
            && self.renamed.is_empty()
    }

    /// Human-readable recommendation line for the cycle log.
    pub fn summary(&self) -> String {
        if self.disruptive() {
            let mut reasons = Vec::new();
            if !self.added.is_empty() {
                reasons.push(format!("{} new tasks", self.added.len()));
            }
            if !self.removed.is_empty() {
                reasons.push(format!("{} removed tasks", self.removed.len()));
            }
            format!(
                "RELOAD RECOMMENDED: {} detected; the set of executable pipelines changed",
                reasons.join(", ")
            )
        } else if !self.rescheduled.is_empty() || !self.renamed.is_empty() {
            "NO RELOAD NEEDED: only cron/name edits detected; picked up next scheduling cycle"
                .to_string()
        } else {
            "NO CHANGES: task configuration is up to date".to_string()
        }
    }
}

/// One due firing of one task, as decided by the cron evaluator.
///
/// `fire_time` is the *scheduled* instant from the cron expression, not the
/// evaluation instant: downstream run-date tagging and result partitioning
/// must reflect when the run was meant to happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireEvent {
    pub task_id: i64,
    pub fire_time: DateTime<Utc>,
    pub dedupe_key: String,
}

impl FireEvent {
    /// The dedupe key is a deterministic composite of task id and the fire
    /// time's epoch second, so the same logical firing never produces two
    /// keys across overlapping evaluation windows.
    pub fn new(task_id: i64, fire_time: DateTime<Utc>) -> Self {
        Self {
            task_id,
            fire_time,
            dedupe_key: format!("report_{}_{}", task_id, fire_time.timestamp()),
        }
    }

    /// Date-based firing parameter handed to the payload fetch.
    pub fn run_date(&self) -> NaiveDate {
        self.fire_time.date_naive()
    }
}

/// Lifecycle state of one remote job run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Submitted,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::TimedOut
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Submitted => "submitted",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(RunStatus::Submitted),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "timed_out" => Ok(RunStatus::TimedOut),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// In-flight state of one dispatched firing, owned by the job runner and
/// discarded once terminal. The durable copy lives with the run-record
/// collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub task_id: i64,
    pub external_job_id: String,
    pub record_id: Option<i64>,
    pub status: RunStatus,
    pub attempts: u32,
    pub result_location: Option<String>,
}

impl JobRun {
    pub fn submitted(task_id: i64, external_job_id: String) -> Self {
        Self {
            task_id,
            external_job_id,
            record_id: None,
            status: RunStatus::Submitted,
            attempts: 0,
            result_location: None,
        }
    }

    /// Move to `next` if that is a forward transition; backward or
    /// post-terminal transitions are ignored.
    pub fn advance(&mut self, next: RunStatus) {
        if self.status.is_terminal() || next < self.status {
            tracing::debug!(
                job_id = %self.external_job_id,
                from = %self.status,
                to = %next,
                "ignoring non-forward status transition"
            );
            return;
        }
        self.status = next;
    }
}
