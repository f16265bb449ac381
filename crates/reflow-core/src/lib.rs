//! `reflow-core` — shared types, configuration, and errors for the reflow
//! report scheduler.
//!
//! Everything here is plain data: the crates that do real work
//! (`reflow-scheduler`, `reflow-pipeline`) depend on this one and nothing
//! else in the workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::ReflowConfig;
pub use error::{CoreError, Result};
pub use types::{
    ChangeReport, CronChange, FireEvent, JobRun, NameChange, RunStatus, ScheduleSnapshot,
    TaskDefinition, TaskEntry,
};
