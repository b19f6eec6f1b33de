use crate::adapters::auth::{
    CachedToken, MetadataServerToken, ServiceAccountToken, StaticToken, DRIVE_READONLY_SCOPE,
};
use crate::adapters::bigquery::BigQueryClient;
use crate::adapters::drive::DriveClient;
use crate::adapters::gcs::GcsClient;
use crate::adapters::http;
use crate::adapters::secret_manager::SecretManagerClient;
use crate::config::{AppConfig, ChainMode};
use crate::core::dag::{TaskGraph, TaskReport};
use crate::core::retry::with_retry;
use crate::core::stage::{Services, TableSteps};
use crate::domain::ports::{CredentialProvider, TokenSource};
use crate::utils::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Outcome of one run across all selected tables.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub chain_mode: ChainMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn failed_tasks(&self) -> impl Iterator<Item = &TaskReport> {
        self.tasks.iter().filter(|t| t.state.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failed_tasks().next().is_none()
    }

    pub fn succeeded(&self) -> usize {
        self.tasks.iter().filter(|t| t.state.is_success()).count()
    }

    pub fn dropped_rows(&self) -> usize {
        self.tasks.iter().filter_map(|t| t.output.dropped_rows).sum()
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn summary(&self) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        let duration = (self.finished_at - self.started_at).num_milliseconds().max(0);

        summary.insert("run_id".to_string(), self.run_id.clone().into());
        summary.insert("total_tasks".to_string(), self.tasks.len().into());
        summary.insert("succeeded_tasks".to_string(), self.succeeded().into());
        summary.insert("failed_tasks".to_string(), self.failed_tasks().count().into());
        summary.insert("dropped_rows".to_string(), self.dropped_rows().into());
        summary.insert("total_duration_ms".to_string(), duration.into());

        let failed: Vec<serde_json::Value> = self
            .failed_tasks()
            .map(|t| serde_json::Value::String(t.task_id.clone()))
            .collect();
        summary.insert("failed_task_ids".to_string(), serde_json::Value::Array(failed));

        summary
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn log_summary(&self) {
        tracing::info!(
            "Run {} finished: {}/{} tasks succeeded, {} rows dropped",
            self.run_id,
            self.succeeded(),
            self.tasks.len(),
            self.dropped_rows()
        );
        for task in self.failed_tasks() {
            tracing::warn!("{}: {:?}", task.task_id, task.state);
        }
    }
}

/// Distinct per run so retried or repeated runs never reuse a load job id.
pub fn new_run_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%dT%H%M%S%6fZ").to_string()
}

pub struct EtlEngine {
    config: Arc<AppConfig>,
    services: Services,
}

impl EtlEngine {
    pub fn new(config: Arc<AppConfig>, services: Services) -> Self {
        Self { config, services }
    }

    /// Opens a session against the real services: one HTTP client, the
    /// ambient token for Secret Manager/Cloud Storage/BigQuery, and a
    /// Drive token minted from the service-account key in Secret Manager.
    pub async fn connect(config: Arc<AppConfig>) -> Result<Self> {
        let client = http::build_client(config.http_timeout)?;
        let endpoints = &config.endpoints;

        let ambient: Arc<dyn TokenSource> = match &config.access_token {
            Some(token) => Arc::new(StaticToken::new(token.clone())),
            None => Arc::new(CachedToken::new(MetadataServerToken::new(
                client.clone(),
                endpoints.metadata.clone(),
            ))),
        };

        let secrets = SecretManagerClient::new(
            client.clone(),
            endpoints.secret_manager.clone(),
            config.project_id.clone(),
            ambient.clone(),
        );
        let (key, _) = with_retry(config.retry, "read service account secret", |_| {
            secrets.service_account(&config.secret_name)
        })
        .await;
        let key = key?;
        tracing::debug!("Using service account {} for Drive", key.client_email);

        let drive_token: Arc<dyn TokenSource> = Arc::new(CachedToken::new(
            ServiceAccountToken::new(client.clone(), key, &[DRIVE_READONLY_SCOPE]),
        ));

        let services = Services {
            fetcher: Arc::new(DriveClient::new(
                client.clone(),
                endpoints.drive.clone(),
                drive_token,
            )),
            store: Arc::new(GcsClient::new(
                client.clone(),
                endpoints.storage.clone(),
                config.gcs_bucket.clone(),
                ambient.clone(),
            )),
            loader: Arc::new(
                BigQueryClient::new(
                    client,
                    endpoints.bigquery.clone(),
                    config.project_id.clone(),
                    ambient,
                )
                .with_location(config.location.clone())
                .with_poll_interval(config.load_poll_interval),
            ),
        };

        Ok(Self::new(config, services))
    }

    /// Builds the task graph without touching any service.
    pub fn plan(config: &AppConfig, only: &[String], chain_mode: ChainMode) -> Result<TaskGraph> {
        let tables = config.descriptors(only)?;
        Ok(TaskGraph::build(tables, chain_mode))
    }

    pub async fn run(&self, only: &[String], chain_mode: Option<ChainMode>) -> Result<RunReport> {
        let chain_mode = chain_mode.unwrap_or(self.config.chain_mode);
        let graph = Self::plan(&self.config, only, chain_mode)?;

        let started_at = Utc::now();
        let run_id = new_run_id(started_at);
        tracing::info!(
            "Run {} started: {} tables, {} tasks, {} chain",
            run_id,
            graph.tables().len(),
            graph.len(),
            chain_mode
        );

        let steps = TableSteps::new(
            self.services.clone(),
            &self.config.gdrive_folder_id,
            &self.config.gcs_bucket,
            &run_id,
        );
        let tasks = graph
            .execute(&steps, self.config.retry, self.config.max_parallel_tables)
            .await;

        let report = RunReport {
            run_id,
            chain_mode,
            started_at,
            finished_at: Utc::now(),
            tasks,
        };
        report.log_summary();
        Ok(report)
    }
}
