//! BigQuery load jobs over the v2 REST API.

use crate::adapters::http;
use crate::config::registry::{ColumnSpec, TableRef};
use crate::domain::model::LoadOutcome;
use crate::domain::ports::{TokenSource, WarehouseLoader};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const WRITE_TRUNCATE: &str = "WRITE_TRUNCATE";
const SOURCE_FORMAT_CSV: &str = "CSV";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsert<'a> {
    job_reference: JobReference,
    configuration: JobConfiguration<'a>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    #[serde(default)]
    project_id: String,
    job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct JobConfiguration<'a> {
    load: LoadConfiguration<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfiguration<'a> {
    source_uris: Vec<&'a str>,
    destination_table: &'a TableRef,
    schema: TableSchema<'a>,
    write_disposition: &'static str,
    skip_leading_rows: u32,
    source_format: &'static str,
    field_delimiter: String,
}

#[derive(Debug, Serialize)]
struct TableSchema<'a> {
    fields: &'a [ColumnSpec],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    #[serde(default)]
    status: JobStatus,
    #[serde(default)]
    statistics: Option<JobStatistics>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    #[serde(default)]
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    #[serde(default)]
    output_rows: Option<String>,
}

impl Job {
    fn is_done(&self) -> bool {
        self.status.state == "DONE"
    }

    fn output_rows(&self) -> Option<u64> {
        self.statistics
            .as_ref()?
            .load
            .as_ref()?
            .output_rows
            .as_deref()?
            .parse()
            .ok()
    }

    fn failure(&self) -> Option<String> {
        let error = self.status.error_result.as_ref()?;
        let mut message = match &error.reason {
            Some(reason) => format!("{}: {}", reason, error.message),
            None => error.message.clone(),
        };
        for detail in self.status.errors.iter().filter(|e| e.message != error.message) {
            message.push_str("; ");
            message.push_str(&detail.message);
        }
        Some(message)
    }
}

pub struct BigQueryClient {
    client: Client,
    base_url: String,
    project_id: String,
    location: Option<String>,
    poll_interval: Duration,
    token: Arc<dyn TokenSource>,
}

impl BigQueryClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        token: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            project_id: project_id.into(),
            location: None,
            poll_interval: Duration::from_secs(2),
            token,
        }
    }

    pub fn with_location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn jobs_url(&self) -> String {
        format!(
            "{}/bigquery/v2/projects/{}/jobs",
            self.base_url, self.project_id
        )
    }

    async fn insert_job(&self, body: &JobInsert<'_>) -> Result<Job> {
        let token = self.token.token().await?;
        let request = self
            .client
            .post(self.jobs_url())
            .bearer_auth(&token.token)
            .json(body);

        let operation = format!("insert load job {}", body.job_reference.job_id);
        let response = http::send(request, &operation).await?;
        http::read_json(response, &operation).await
    }

    async fn get_job(&self, reference: &JobReference) -> Result<Job> {
        let token = self.token.token().await?;
        let mut request = self
            .client
            .get(format!("{}/{}", self.jobs_url(), reference.job_id))
            .bearer_auth(&token.token);
        if let Some(location) = &reference.location {
            request = request.query(&[("location", location.as_str())]);
        }

        let operation = format!("poll load job {}", reference.job_id);
        let response = http::send(request, &operation).await?;
        http::read_json(response, &operation).await
    }
}

fn load_request<'a>(
    project_id: &str,
    location: Option<&str>,
    source_uri: &'a str,
    destination: &'a TableRef,
    columns: &'a [ColumnSpec],
    job_id: &str,
) -> JobInsert<'a> {
    JobInsert {
        job_reference: JobReference {
            project_id: project_id.to_string(),
            job_id: job_id.to_string(),
            location: location.map(str::to_string),
        },
        configuration: JobConfiguration {
            load: LoadConfiguration {
                source_uris: vec![source_uri],
                destination_table: destination,
                schema: TableSchema { fields: columns },
                write_disposition: WRITE_TRUNCATE,
                skip_leading_rows: 1,
                source_format: SOURCE_FORMAT_CSV,
                field_delimiter: ",".to_string(),
            },
        },
    }
}

#[async_trait]
impl WarehouseLoader for BigQueryClient {
    async fn load_csv(
        &self,
        source_uri: &str,
        destination: &TableRef,
        columns: &[ColumnSpec],
        job_id: &str,
    ) -> Result<LoadOutcome> {
        let body = load_request(
            &self.project_id,
            self.location.as_deref(),
            source_uri,
            destination,
            columns,
            job_id,
        );

        tracing::info!("Loading {} into {} (job {})", source_uri, destination, job_id);
        let mut job = self.insert_job(&body).await?;

        while !job.is_done() {
            tracing::debug!("Job {} is {}", job_id, job.status.state);
            tokio::time::sleep(self.poll_interval).await;
            job = self.get_job(&job.job_reference).await?;
        }

        if let Some(message) = job.failure() {
            return Err(EtlError::LoadJob {
                job_id: job_id.to_string(),
                message,
            });
        }

        Ok(LoadOutcome {
            job_id: job.job_reference.job_id.clone(),
            output_rows: job.output_rows(),
        })
    }
}
