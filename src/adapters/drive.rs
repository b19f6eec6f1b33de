use crate::adapters::http;
use crate::domain::model::RawFilePayload;
use crate::domain::ports::{SourceFetcher, TokenSource};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
}

/// Google Drive v3 client that reads files by name from one folder.
pub struct DriveClient {
    client: Client,
    base_url: String,
    token: Arc<dyn TokenSource>,
}

impl DriveClient {
    pub fn new(client: Client, base_url: impl Into<String>, token: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    async fn list_matches(&self, file_name: &str, folder_id: &str) -> Result<Vec<DriveFile>> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            escape_query_value(folder_id),
            escape_query_value(file_name)
        );
        let token = self.token.token().await?;
        let request = self
            .client
            .get(format!("{}/drive/v3/files", self.base_url))
            .bearer_auth(&token.token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name,modifiedTime)"),
                ("orderBy", "modifiedTime desc"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ]);

        let response = http::send(request, "list Drive folder").await?;
        let list: FileList = http::read_json(response, "list Drive folder").await?;
        Ok(list.files)
    }

    async fn download(&self, file: &DriveFile) -> Result<Vec<u8>> {
        let token = self.token.token().await?;
        let request = self
            .client
            .get(format!("{}/drive/v3/files/{}", self.base_url, file.id))
            .bearer_auth(&token.token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);

        let operation = format!("download {}", file.name);
        let response = http::send(request, &operation).await?;
        http::read_bytes(response, &operation).await
    }
}

#[async_trait]
impl SourceFetcher for DriveClient {
    async fn fetch(&self, file_name: &str, folder_id: &str) -> Result<RawFilePayload> {
        let matches = self.list_matches(file_name, folder_id).await?;

        let Some(file) = select_latest(&matches) else {
            return Err(EtlError::not_found(format!(
                "{} in Drive folder {}",
                file_name, folder_id
            )));
        };

        if matches.len() > 1 {
            let ids: Vec<&str> = matches.iter().map(|f| f.id.as_str()).collect();
            tracing::warn!(
                "{} files named {} in folder {} ({}); using most recently modified {}",
                matches.len(),
                file_name,
                folder_id,
                ids.join(", "),
                file.id
            );
        }

        let bytes = self.download(file).await?;
        tracing::debug!("Downloaded {} ({} bytes)", file_name, bytes.len());

        Ok(RawFilePayload {
            file_id: file.id.clone(),
            file_name: file.name.clone(),
            bytes,
        })
    }
}

/// Most recently modified file; ties and missing timestamps keep listing order.
fn select_latest(files: &[DriveFile]) -> Option<&DriveFile> {
    files.iter().fold(None, |best: Option<&DriveFile>, candidate| match best {
        Some(current) if candidate.modified_time <= current.modified_time => Some(current),
        _ => Some(candidate),
    })
}

/// Escapes a value for a single-quoted Drive query string.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}
