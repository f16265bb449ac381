//! reqwest implementations of the collaborator seams.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reflow_core::TaskDefinition;
use reflow_scheduler::{RegistryError, TaskRegistry};
use serde::Deserialize;
use tracing::debug;

use crate::clients::{
    ClientError, ExecutionClient, JobStatusResponse, PayloadSource, ResultStore, RunRecorder,
};

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Upstream registry: task definitions, per-firing payloads, and run-record
/// rows all live behind one bearer-authenticated API.
pub struct HttpTaskRegistry {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

#[derive(Deserialize)]
struct TaskListEnvelope {
    #[serde(default)]
    data: Vec<TaskDefinition>,
}

impl HttpTaskRegistry {
    pub fn new(
        base_url: String,
        api_token: String,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_token,
        })
    }

    async fn list(&self) -> Result<Vec<TaskDefinition>, ClientError> {
        let url = format!("{}/api/reports/", self.base_url);
        debug!(%url, "listing task definitions");
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let envelope: TaskListEnvelope = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(envelope.data)
    }
}

#[async_trait]
impl TaskRegistry for HttpTaskRegistry {
    async fn list_tasks(&self) -> Result<Vec<TaskDefinition>, RegistryError> {
        self.list().await.map_err(|e| RegistryError(e.to_string()))
    }
}

#[async_trait]
impl PayloadSource for HttpTaskRegistry {
    async fn fetch_payload(
        &self,
        task_id: i64,
        run_date: NaiveDate,
    ) -> Result<serde_json::Value, ClientError> {
        let url = format!("{}/api/reports/{}/data/", self.base_url, task_id);
        let resp = self
            .client
            .get(&url)
            .query(&[("run_date", run_date.to_string())])
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }
}

/// Execution service: submit, status, results.
pub struct HttpExecutionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    job_id: String,
}

impl HttpExecutionClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    async fn submit(&self, payload: &serde_json::Value) -> Result<String, ClientError> {
        let url = format!("{}/submit", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        let parsed: SubmitResponse = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(parsed.job_id)
    }

    async fn status(&self, job_id: &str) -> Result<JobStatusResponse, ClientError> {
        let url = format!("{}/jobs/{}/status", self.base_url, job_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))
    }

    async fn fetch_result(&self, job_id: &str) -> Result<Vec<u8>, ClientError> {
        let url = format!("{}/jobs/{}/results", self.base_url, job_id);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let bytes = check(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}

/// Run records kept as rows in the registry service.
pub struct HttpRunRecorder {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

#[derive(Deserialize)]
struct RecordCreated {
    id: i64,
}

impl HttpRunRecorder {
    pub fn new(base_url: String, api_token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }
}

#[async_trait]
impl RunRecorder for HttpRunRecorder {
    async fn create(&self, task_id: i64, external_job_id: &str) -> Result<i64, ClientError> {
        let url = format!("{}/api/jobs/", self.base_url);
        let body = serde_json::json!({
            "report": task_id,
            "external_job_id": external_job_id,
            "status": "submitted",
        });
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await?;
        let created: RecordCreated = check(resp)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(created.id)
    }

    async fn update_status(&self, record_id: i64, status: &str) -> Result<(), ClientError> {
        let url = format!("{}/api/jobs/{}/", self.base_url, record_id);
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn complete(
        &self,
        record_id: i64,
        status: &str,
        result_location: &str,
    ) -> Result<(), ClientError> {
        let url = format!("{}/api/jobs/{}/", self.base_url, record_id);
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({
                "status": status,
                "results_url": result_location,
            }))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Filesystem result sink. Blob storage proper is an external collaborator;
/// this is the bundled default for single-host deployments.
pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn store(&self, bytes: &[u8], name: &str) -> Result<String, ClientError> {
        let path = self.root.join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(path.display().to_string())
    }
}
