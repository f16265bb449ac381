//! `reflow-scheduler` — the evaluation side of reflow.
//!
//! # Overview
//!
//! One evaluation cycle runs: discover task definitions → diff against the
//! persisted snapshot → evaluate each cron against the current window →
//! filter through the dedupe registry → hand due firings to the dispatch
//! channel. The cycle is pure computation plus one snapshot load/store; the
//! expensive work (submitting and polling remote jobs) happens downstream in
//! `reflow-pipeline`.
//!
//! # Timing model
//!
//! | Piece            | Behaviour                                            |
//! |------------------|------------------------------------------------------|
//! | Window           | Re-checks the last `window_secs` every tick          |
//! | Window bounds    | Half-open `(start, end]`, whole-second granularity   |
//! | Overlap          | Deliberate: at-least-once firing across missed ticks |
//! | Dedupe registry  | Turns at-least-once into at-most-once dispatch       |

pub mod cron;
pub mod dedupe;
pub mod detector;
pub mod driver;
pub mod error;
pub mod store;

pub use self::cron::CronEvaluator;
pub use dedupe::DedupeRegistry;
pub use detector::ChangeDetector;
pub use driver::{CycleOutcome, RegistryError, SchedulingDriver, TaskRegistry};
pub use error::{Result, SchedulerError};
pub use store::{JsonFileStore, MemoryStore, SnapshotStore};
