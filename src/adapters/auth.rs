//! OAuth2 token sources and the run-scoped token cache.

use crate::adapters::http;
use crate::domain::model::{AccessToken, ServiceAccountKey};
use crate::domain::ports::TokenSource;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl From<TokenResponse> for AccessToken {
    fn from(resp: TokenResponse) -> Self {
        AccessToken {
            token: resp.access_token,
            expires_in: resp.expires_in,
        }
    }
}

/// A token handed in from outside, e.g. `GOOGLE_OAUTH_ACCESS_TOKEN`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<AccessToken> {
        Ok(AccessToken {
            token: self.0.clone(),
            expires_in: None,
        })
    }
}

/// Default service account of the GCE / Composer instance.
pub struct MetadataServerToken {
    client: Client,
    base_url: String,
}

impl MetadataServerToken {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TokenSource for MetadataServerToken {
    async fn token(&self) -> Result<AccessToken> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.base_url
        );
        let request = self.client.get(url).header("Metadata-Flavor", "Google");
        let response = http::send(request, "metadata server token")
            .await
            .map_err(|e| match e {
                EtlError::TransientIo { .. } => e,
                other => EtlError::auth(format!("no ambient credentials: {}", other)),
            })?;
        let token: TokenResponse = http::read_json(response, "metadata server token").await?;
        Ok(token.into())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Exchanges a signed JWT for an access token (RFC 7523 bearer grant).
pub struct ServiceAccountToken {
    client: Client,
    key: ServiceAccountKey,
    scopes: Vec<String>,
}

impl ServiceAccountToken {
    pub fn new(client: Client, key: ServiceAccountKey, scopes: &[&str]) -> Self {
        Self {
            client,
            key,
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn assertion(&self, now: i64) -> Result<String> {
        let claims = Claims {
            iss: self.key.client_email.clone(),
            scope: self.scopes.join(" "),
            aud: self.key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| EtlError::auth(format!("invalid service account private key: {}", e)))?;

        jsonwebtoken::encode(&header, &claims, &signing_key)
            .map_err(|e| EtlError::auth(format!("failed to sign token request: {}", e)))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountToken {
    async fn token(&self) -> Result<AccessToken> {
        let assertion = self.assertion(chrono::Utc::now().timestamp())?;
        let request = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);

        let response = http::send(request, "service account token exchange").await?;
        let token: TokenResponse =
            http::read_json(response, "service account token exchange").await?;

        tracing::debug!(
            "Obtained access token for {} (expires in {:?}s)",
            self.key.client_email,
            token.expires_in
        );
        Ok(token.into())
    }
}

/// Reuses a token until shortly before it expires.
///
/// One cache lives for one run; dropping it at run end discards the token.
pub struct CachedToken<S> {
    inner: S,
    refresh_margin: Duration,
    cached: Mutex<Option<(AccessToken, Option<Instant>)>>,
}

impl<S: TokenSource> CachedToken<S> {
    pub fn new(inner: S) -> Self {
        Self::with_refresh_margin(inner, Duration::from_secs(60))
    }

    pub fn with_refresh_margin(inner: S, refresh_margin: Duration) -> Self {
        Self {
            inner,
            refresh_margin,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for CachedToken<S> {
    async fn token(&self) -> Result<AccessToken> {
        let mut cached = self.cached.lock().await;

        if let Some((token, valid_until)) = cached.as_ref() {
            match valid_until {
                None => return Ok(token.clone()),
                Some(deadline) if Instant::now() < *deadline => return Ok(token.clone()),
                Some(_) => tracing::debug!("Cached access token expired, refreshing"),
            }
        }

        let fresh = self.inner.token().await?;
        let valid_until = fresh.expires_in.map(|secs| {
            Instant::now() + Duration::from_secs(secs).saturating_sub(self.refresh_margin)
        });
        *cached = Some((fresh.clone(), valid_until));
        Ok(fresh)
    }
}
