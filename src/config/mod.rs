pub mod cli;
pub mod file;
pub mod registry;

use crate::config::file::FileConfig;
use crate::config::registry::{registry, DatasetDescriptor};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SECRET_NAME: &str = "ecommerce_elt_pipeline_service_account";
pub const DEFAULT_DATASET: &str = "ecommerce_data";
/// Midnight UTC every day (sec min hour day-of-month month day-of-week year).
pub const DEFAULT_SCHEDULE: &str = "0 0 0 * * * *";

/// How the per-table chains are wired together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChainMode {
    /// Table N's load precedes table N+1's stage; the whole run is one chain.
    Linear,
    /// No edges between tables; independent tables may run in parallel.
    Independent,
}

impl fmt::Display for ChainMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainMode::Linear => write!(f, "linear"),
            ChainMode::Independent => write!(f, "independent"),
        }
    }
}

impl FromStr for ChainMode {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(ChainMode::Linear),
            "independent" => Ok(ChainMode::Independent),
            other => Err(EtlError::InvalidConfigValue {
                field: "chain_mode".to_string(),
                value: other.to_string(),
                reason: "expected 'linear' or 'independent'".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 1,
            delay: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub drive: String,
    pub storage: String,
    pub bigquery: String,
    pub secret_manager: String,
    pub metadata: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            drive: "https://www.googleapis.com".to_string(),
            storage: "https://storage.googleapis.com".to_string(),
            bigquery: "https://bigquery.googleapis.com".to_string(),
            secret_manager: "https://secretmanager.googleapis.com".to_string(),
            metadata: "http://metadata.google.internal".to_string(),
        }
    }
}

impl Endpoints {
    /// Every service pointed at one base URL; used against local fakes.
    pub fn all(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            drive: base.clone(),
            storage: base.clone(),
            bigquery: base.clone(),
            secret_manager: base.clone(),
            metadata: base,
        }
    }
}

/// Process configuration, built once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub project_id: String,
    pub gcs_bucket: String,
    pub gdrive_folder_id: String,
    pub secret_name: String,
    pub dataset: String,
    pub location: Option<String>,
    pub retry: RetryPolicy,
    pub chain_mode: ChainMode,
    pub max_parallel_tables: usize,
    pub schedule: String,
    pub http_timeout: Duration,
    pub load_poll_interval: Duration,
    /// Ambient bearer token; when absent the metadata server is asked.
    pub access_token: Option<String>,
    pub endpoints: Endpoints,
}

impl AppConfig {
    pub fn new(
        project_id: impl Into<String>,
        gcs_bucket: impl Into<String>,
        gdrive_folder_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            gcs_bucket: gcs_bucket.into(),
            gdrive_folder_id: gdrive_folder_id.into(),
            secret_name: DEFAULT_SECRET_NAME.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            location: None,
            retry: RetryPolicy::default(),
            chain_mode: ChainMode::Independent,
            max_parallel_tables: 4,
            schedule: DEFAULT_SCHEDULE.to_string(),
            http_timeout: Duration::from_secs(300),
            load_poll_interval: Duration::from_millis(2000),
            access_token: None,
            endpoints: Endpoints::default(),
        }
    }

    pub fn from_env(file: Option<FileConfig>) -> Result<Self> {
        Self::resolve(file.unwrap_or_default(), |key| std::env::var(key).ok())
    }

    /// Merges environment values over file values over defaults, then validates.
    pub fn resolve(file: FileConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let project_id = get("GCP_PROJECT_ID").or(file.project_id);
        let gcs_bucket = get("GCS_BUCKET_NAME").or(file.gcs_bucket);
        let gdrive_folder_id = get("GDRIVE_FOLDER_ID").or(file.gdrive_folder_id);

        let mut config = Self::new(
            validate_required_field("GCP_PROJECT_ID", &project_id)?.clone(),
            validate_required_field("GCS_BUCKET_NAME", &gcs_bucket)?.clone(),
            validate_required_field("GDRIVE_FOLDER_ID", &gdrive_folder_id)?.clone(),
        );

        if let Some(v) = get("ETL_SECRET_NAME").or(file.secret_name) {
            config.secret_name = v;
        }
        if let Some(v) = get("BQ_DATASET").or(file.dataset) {
            config.dataset = v;
        }
        config.location = get("BQ_LOCATION").or(file.location);

        if let Some(v) = parse_env::<u32>(&get, "ETL_RETRIES")?.or(file.retries) {
            config.retry.retries = v;
        }
        if let Some(v) = parse_env::<u64>(&get, "ETL_RETRY_DELAY_SECS")?.or(file.retry_delay_secs) {
            config.retry.delay = Duration::from_secs(v);
        }
        if let Some(v) = get("ETL_CHAIN_MODE").or(file.chain_mode) {
            config.chain_mode = v.parse()?;
        }
        if let Some(v) =
            parse_env::<usize>(&get, "ETL_MAX_PARALLEL_TABLES")?.or(file.max_parallel_tables)
        {
            config.max_parallel_tables = v;
        }
        if let Some(v) = get("ETL_SCHEDULE").or(file.schedule) {
            config.schedule = v;
        }
        if let Some(v) = parse_env::<u64>(&get, "ETL_HTTP_TIMEOUT_SECS")?.or(file.http_timeout_secs)
        {
            config.http_timeout = Duration::from_secs(v);
        }
        if let Some(v) =
            parse_env::<u64>(&get, "ETL_LOAD_POLL_MS")?.or(file.load_poll_interval_ms)
        {
            config.load_poll_interval = Duration::from_millis(v);
        }
        config.access_token = get("GOOGLE_OAUTH_ACCESS_TOKEN");

        if let Some(host) = get("STORAGE_EMULATOR_HOST") {
            config.endpoints.storage = host.trim_end_matches('/').to_string();
        }
        if let Some(host) = get("BIGQUERY_EMULATOR_HOST") {
            config.endpoints.bigquery = host.trim_end_matches('/').to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Registry descriptors for this project, optionally restricted to `only`.
    pub fn descriptors(&self, only: &[String]) -> Result<Vec<DatasetDescriptor>> {
        let all = registry(&self.project_id, &self.dataset);
        if only.is_empty() {
            return Ok(all);
        }

        if let Some(unknown) = only.iter().find(|name| !all.iter().any(|d| &d.name == *name)) {
            return Err(EtlError::InvalidConfigValue {
                field: "only".to_string(),
                value: unknown.clone(),
                reason: "not a registered table".to_string(),
            });
        }

        Ok(all
            .into_iter()
            .filter(|d| only.iter().any(|name| name == &d.name))
            .collect())
    }
}

fn parse_env<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| EtlError::InvalidConfigValue {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("project_id", &self.project_id)?;
        validate_non_empty_string("gdrive_folder_id", &self.gdrive_folder_id)?;
        validate_non_empty_string("secret_name", &self.secret_name)?;
        validate_gcs_bucket_name("gcs_bucket", &self.gcs_bucket)?;
        validate_bigquery_identifier("dataset", &self.dataset)?;

        validate_range("retries", self.retry.retries, 0, 10)?;
        validate_range("retry_delay_secs", self.retry.delay.as_secs(), 0, 3600)?;
        validate_range("http_timeout_secs", self.http_timeout.as_secs(), 1, 3600)?;
        validate_range("max_parallel_tables", self.max_parallel_tables, 1, 64)?;
        validate_range(
            "load_poll_interval_ms",
            self.load_poll_interval.as_millis(),
            1,
            600_000,
        )?;

        crate::core::schedule::parse_schedule(&self.schedule)?;

        validate_url("drive endpoint", &self.endpoints.drive)?;
        validate_url("storage endpoint", &self.endpoints.storage)?;
        validate_url("bigquery endpoint", &self.endpoints.bigquery)?;
        validate_url("secret manager endpoint", &self.endpoints.secret_manager)?;
        validate_url("metadata endpoint", &self.endpoints.metadata)?;

        tracing::debug!("Configuration validation passed");
        Ok(())
    }
}
