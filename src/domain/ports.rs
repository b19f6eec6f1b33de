use crate::config::registry::{ColumnSpec, TableRef};
use crate::domain::model::{
    AccessToken, LoadOutcome, RawFilePayload, ServiceAccountKey, StagedObject,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Produces OAuth2 bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<AccessToken>;
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn service_account(&self, secret_name: &str) -> Result<ServiceAccountKey>;
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, file_name: &str, folder_id: &str) -> Result<RawFilePayload>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        folder: &str,
        file_name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StagedObject>;
}

#[async_trait]
pub trait WarehouseLoader: Send + Sync {
    /// Replaces `destination` with the CSV at `source_uri`, skipping its header row.
    async fn load_csv(
        &self,
        source_uri: &str,
        destination: &TableRef,
        columns: &[ColumnSpec],
        job_id: &str,
    ) -> Result<LoadOutcome>;
}
