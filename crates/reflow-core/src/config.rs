use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Polling budget defaults: 120 attempts at 60 s is a 2-hour ceiling per job.
pub const DEFAULT_WINDOW_SECS: u64 = 60;
pub const DEFAULT_DEDUPE_RETENTION_SECS: u64 = 600;
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 120;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 4;

/// Top-level config (reflow.toml + REFLOW_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflowConfig {
    pub registry: RegistryConfig,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Upstream task-definition registry (also hosts the run-record rows).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub base_url: String,
    pub api_token: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Downstream execution service that actually runs report jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Length of the overlapping evaluation window, and the tick cadence.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// How long dispatched dedupe keys are remembered. Must exceed the
    /// window overlap; keep it several windows long.
    #[serde(default = "default_dedupe_retention_secs")]
    pub dedupe_retention_secs: u64,
    /// Where the task-definition snapshot is persisted between cycles.
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_secs: DEFAULT_WINDOW_SECS,
            dedupe_retention_secs: DEFAULT_DEDUPE_RETENTION_SECS,
            snapshot_path: default_snapshot_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// One blocked worker per in-flight job; size for the remote service's
    /// rate limits.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Prefix under which result payloads are stored.
    #[serde(default = "default_result_prefix")]
    pub result_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_poll_attempts: DEFAULT_MAX_POLL_ATTEMPTS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            max_concurrent_jobs: DEFAULT_MAX_CONCURRENT_JOBS,
            result_prefix: default_result_prefix(),
        }
    }
}

impl ReflowConfig {
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or("reflow.toml");

        let config: ReflowConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("REFLOW_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_window_secs() -> u64 {
    DEFAULT_WINDOW_SECS
}

fn default_dedupe_retention_secs() -> u64 {
    DEFAULT_DEDUPE_RETENTION_SECS
}

fn default_snapshot_path() -> String {
    ".reflow_snapshot.json".to_string()
}

fn default_max_poll_attempts() -> u32 {
    DEFAULT_MAX_POLL_ATTEMPTS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}

fn default_result_prefix() -> String {
    "reports".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_polling_budget() {
        let pipeline = PipelineConfig::default();
        assert_eq!(pipeline.max_poll_attempts, 120);
        assert_eq!(pipeline.poll_interval_secs, 60);
    }

    #[test]
    fn dedupe_retention_exceeds_window() {
        let scheduler = SchedulerConfig::default();
        assert!(scheduler.dedupe_retention_secs >= scheduler.window_secs * 2);
    }
}
