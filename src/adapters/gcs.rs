use crate::adapters::http;
use crate::domain::model::{staged_object_path, StagedObject};
use crate::domain::ports::{ObjectStore, TokenSource};
use crate::utils::error::Result;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    #[serde(default)]
    generation: Option<String>,
}

/// Cloud Storage JSON API client bound to one bucket.
pub struct GcsClient {
    client: Client,
    base_url: String,
    bucket: String,
    token: Arc<dyn TokenSource>,
}

impl GcsClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        token: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            bucket: bucket.into(),
            token,
        }
    }
}

#[async_trait]
impl ObjectStore for GcsClient {
    async fn put_object(
        &self,
        folder: &str,
        file_name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StagedObject> {
        let path = staged_object_path(folder, file_name);
        let size_bytes = data.len() as u64;

        let token = self.token.token().await?;
        let request = self
            .client
            .post(format!(
                "{}/upload/storage/v1/b/{}/o",
                self.base_url, self.bucket
            ))
            .bearer_auth(&token.token)
            .query(&[("uploadType", "media"), ("name", path.as_str())])
            .header(CONTENT_TYPE, content_type)
            .body(data);

        let operation = format!("upload gs://{}/{}", self.bucket, path);
        let response = http::send(request, &operation).await?;
        let object: ObjectResource = http::read_json(response, &operation).await?;

        tracing::debug!(
            "Uploaded {} bytes to gs://{}/{} (generation {})",
            size_bytes,
            self.bucket,
            object.name,
            object.generation.as_deref().unwrap_or("?")
        );

        Ok(StagedObject {
            bucket: self.bucket.clone(),
            path,
            size_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::StaticToken;
    use crate::utils::error::EtlError;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> GcsClient {
        GcsClient::new(
            Client::new(),
            server.base_url(),
            "ecommerce-staging",
            Arc::new(StaticToken::new("ambient")),
        )
    }

    #[tokio::test]
    async fn test_put_object_uploads_media() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/upload/storage/v1/b/ecommerce-staging/o")
                    .query_param("uploadType", "media")
                    .query_param("name", "data/olist_sellers.csv")
                    .header("Content-Type", "text/csv")
                    .header("Authorization", "Bearer ambient")
                    .body("seller_id,seller_city\ns1,campinas\n");
                then.status(200).json_body(serde_json::json!({
                    "name": "data/olist_sellers.csv",
                    "bucket": "ecommerce-staging",
                    "generation": "1731700000000000",
                    "size": "34"
                }));
            })
            .await;

        let staged = client(&server)
            .put_object(
                "data",
                "olist_sellers.csv",
                b"seller_id,seller_city\ns1,campinas\n".to_vec(),
                "text/csv",
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(staged.gs_uri(), "gs://ecommerce-staging/data/olist_sellers.csv");
        assert_eq!(staged.size_bytes, 34);
    }

    #[tokio::test]
    async fn test_put_object_forbidden() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(403).json_body(serde_json::json!({
                    "error": {"code": 403, "message": "does not have storage.objects.create access"}
                }));
            })
            .await;

        let err = client(&server)
            .put_object("data", "x.csv", b"a\n".to_vec(), "text/csv")
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Auth { .. }));
    }
}
