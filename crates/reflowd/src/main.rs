use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use reflow_core::ReflowConfig;
use reflow_pipeline::{
    DispatchPool, FsResultStore, HttpExecutionClient, HttpRunRecorder, HttpTaskRegistry,
    JobRunner, RunnerConfig,
};
use reflow_scheduler::{ChangeDetector, DedupeRegistry, JsonFileStore, SchedulingDriver};

#[derive(Parser)]
#[command(name = "reflowd", about = "Recurring report scheduling daemon")]
struct Args {
    /// Config file path (falls back to REFLOW_CONFIG, then ./reflow.toml)
    #[arg(long)]
    config: Option<String>,

    /// Override the evaluation window length in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Directory for locally stored results
    #[arg(long, default_value = "./results")]
    results_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reflowd=info,reflow_scheduler=info,reflow_pipeline=info".into()),
        )
        .init();

    let args = Args::parse();

    let config_path = args.config.or_else(|| std::env::var("REFLOW_CONFIG").ok());
    let mut config = ReflowConfig::load(config_path.as_deref())?;
    if let Some(window) = args.window_secs {
        config.scheduler.window_secs = window;
    }

    info!(
        registry = %config.registry.base_url,
        execution = %config.execution.base_url,
        window_secs = config.scheduler.window_secs,
        "reflowd starting"
    );

    let registry = Arc::new(HttpTaskRegistry::new(
        config.registry.base_url.clone(),
        config.registry.api_token.clone(),
        Duration::from_secs(config.registry.timeout_secs),
    )?);
    let execution = Arc::new(HttpExecutionClient::new(
        config.execution.base_url.clone(),
        config.execution.api_key.clone(),
    ));
    let recorder = Arc::new(HttpRunRecorder::new(
        config.registry.base_url.clone(),
        config.registry.api_token.clone(),
    ));
    let storage = Arc::new(FsResultStore::new(&args.results_dir));

    // Fired-event channel: SchedulingDriver → DispatchPool
    let (fired_tx, fired_rx) = tokio::sync::mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let driver = SchedulingDriver::new(
        registry.clone(),
        ChangeDetector::new(JsonFileStore::new(&config.scheduler.snapshot_path)),
        DedupeRegistry::new(chrono::Duration::seconds(
            config.scheduler.dedupe_retention_secs as i64,
        )),
        chrono::Duration::seconds(config.scheduler.window_secs as i64),
        fired_tx,
    );

    let runner = Arc::new(JobRunner::new(
        execution,
        recorder,
        storage,
        RunnerConfig::from(&config.pipeline),
    ));
    let pool = DispatchPool::new(runner, registry, config.pipeline.max_concurrent_jobs);

    let driver_task = tokio::spawn(driver.run(shutdown_rx.clone()));
    let pool_task = tokio::spawn(pool.run(fired_rx, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let _ = driver_task.await;
    let _ = pool_task.await;
    info!("reflowd stopped");
    Ok(())
}
