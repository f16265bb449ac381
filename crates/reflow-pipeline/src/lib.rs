//! `reflow-pipeline` — the dispatch side of reflow.
//!
//! A fired task flows: fetch payload → submit to the execution service →
//! create the local run record → poll until terminal → store the result.
//! Each firing is independent; the [`pool::DispatchPool`] runs them
//! concurrently under a worker bound, and a failure in one firing never
//! touches its siblings.

pub mod clients;
pub mod error;
pub mod http;
pub mod pool;
pub mod runner;

pub use clients::{ClientError, ExecutionClient, JobStatusResponse, PayloadSource, ResultStore, RunRecorder};
pub use error::PipelineError;
pub use http::{FsResultStore, HttpExecutionClient, HttpRunRecorder, HttpTaskRegistry};
pub use pool::DispatchPool;
pub use runner::{JobRunner, RunnerConfig};
