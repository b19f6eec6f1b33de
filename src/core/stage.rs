use crate::config::registry::DatasetDescriptor;
use crate::core::dag::{TaskKind, TaskOutput, TaskRunner};
use crate::core::sanitize::sanitize;
use crate::domain::model::{LoadOutcome, StagedObject};
use crate::domain::ports::{ObjectStore, SourceFetcher, WarehouseLoader};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub const CSV_CONTENT_TYPE: &str = "text/csv";

/// The external collaborators one run talks to.
#[derive(Clone)]
pub struct Services {
    pub fetcher: Arc<dyn SourceFetcher>,
    pub store: Arc<dyn ObjectStore>,
    pub loader: Arc<dyn WarehouseLoader>,
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub staged: StagedObject,
    pub kept_rows: usize,
    pub dropped_rows: usize,
}

/// The two steps of a table: fetch/sanitize/stage, then bulk load.
pub struct TableSteps {
    services: Services,
    folder_id: String,
    bucket: String,
    run_id: String,
}

impl TableSteps {
    pub fn new(services: Services, folder_id: &str, bucket: &str, run_id: &str) -> Self {
        Self {
            services,
            folder_id: folder_id.to_string(),
            bucket: bucket.to_string(),
            run_id: run_id.to_string(),
        }
    }

    pub async fn stage(&self, table: &DatasetDescriptor) -> Result<StageOutcome> {
        let file_name = table.file_name();
        let raw = self
            .services
            .fetcher
            .fetch(&file_name, &self.folder_id)
            .await?;

        let clean = sanitize(&raw.bytes).map_err(|e| match e {
            EtlError::MalformedInput { message, .. } => EtlError::malformed(&file_name, message),
            other => other,
        })?;

        if clean.dropped_rows > 0 {
            tracing::warn!(
                "Dropped {} malformed rows from {} ({} kept)",
                clean.dropped_rows,
                file_name,
                clean.kept_rows
            );
        }
        if clean.header.len() != table.columns.len() {
            tracing::warn!(
                "{} has {} header fields but {} declares {} columns",
                file_name,
                clean.header.len(),
                table.destination,
                table.columns.len()
            );
        }

        let staged = self
            .services
            .store
            .put_object(
                &table.staging_folder,
                &file_name,
                clean.text.into_bytes(),
                CSV_CONTENT_TYPE,
            )
            .await?;

        tracing::info!(
            "Staged {} rows of {} at {}",
            clean.kept_rows,
            file_name,
            staged.gs_uri()
        );

        Ok(StageOutcome {
            staged,
            kept_rows: clean.kept_rows,
            dropped_rows: clean.dropped_rows,
        })
    }

    pub async fn load(&self, table: &DatasetDescriptor, attempt: u32) -> Result<LoadOutcome> {
        let source_uri = StagedObject::uri_for(&self.bucket, &table.object_path());
        let job_id = load_job_id(&table.name, &self.run_id, attempt);

        let outcome = self
            .services
            .loader
            .load_csv(&source_uri, &table.destination, &table.columns, &job_id)
            .await?;

        tracing::info!(
            "Loaded {} into {} ({} rows)",
            source_uri,
            table.destination,
            outcome
                .output_rows
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string())
        );
        Ok(outcome)
    }
}

#[async_trait]
impl TaskRunner for TableSteps {
    async fn run_task(
        &self,
        table: &DatasetDescriptor,
        kind: TaskKind,
        attempt: u32,
    ) -> Result<TaskOutput> {
        match kind {
            TaskKind::Stage => {
                let outcome = self.stage(table).await?;
                Ok(TaskOutput {
                    kept_rows: Some(outcome.kept_rows),
                    dropped_rows: Some(outcome.dropped_rows),
                    ..TaskOutput::default()
                })
            }
            TaskKind::Load => {
                let outcome = self.load(table, attempt).await?;
                Ok(TaskOutput {
                    job_id: Some(outcome.job_id),
                    output_rows: outcome.output_rows,
                    ..TaskOutput::default()
                })
            }
        }
    }
}

/// BigQuery job ids allow letters, digits, `_` and `-`; one id per attempt.
pub fn load_job_id(table: &str, run_id: &str, attempt: u32) -> String {
    format!("load_{}_{}_{}", table, run_id, attempt)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}
