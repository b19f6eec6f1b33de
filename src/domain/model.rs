use serde::{Deserialize, Serialize};

/// Bytes of one downloaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFilePayload {
    pub file_id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// CSV text with malformed rows removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedPayload {
    pub text: String,
    pub header: Vec<String>,
    pub kept_rows: usize,
    pub dropped_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedObject {
    pub bucket: String,
    pub path: String,
    pub size_bytes: u64,
}

/// Object name of `file_name` inside a staging folder.
pub fn staged_object_path(folder: &str, file_name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), file_name)
}

impl StagedObject {
    pub fn gs_uri(&self) -> String {
        Self::uri_for(&self.bucket, &self.path)
    }

    pub fn uri_for(bucket: &str, path: &str) -> String {
        format!("gs://{}/{}", bucket, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub job_id: String,
    pub output_rows: Option<u64>,
}

/// OAuth2 service account key as stored in Secret Manager.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    /// Seconds until expiry as reported by the issuer, if any.
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
