use thiserror::Error;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The cron expression is malformed. Isolated per task: one bad
    /// expression never aborts evaluation of the others.
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidSchedule { expr: String, reason: String },

    /// The discovery fetch failed. Aborts the whole cycle; the previous
    /// snapshot is retained and never interpreted as "tasks were removed".
    #[error("task registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// Hand-off of a claimed firing failed; the firing is skipped and
    /// recomputes as due (or missed) next cycle.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    #[error("snapshot I/O error: {0}")]
    SnapshotIo(#[from] std::io::Error),

    #[error("snapshot format error: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
