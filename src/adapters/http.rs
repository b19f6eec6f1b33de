use crate::utils::error::{EtlError, Result};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("drive-etl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EtlError::config(format!("failed to build HTTP client: {}", e)))
}

/// Sends the request and maps transport failures and error statuses.
pub async fn send(request: RequestBuilder, operation: &str) -> Result<Response> {
    let response = request
        .send()
        .await
        .map_err(|e| EtlError::transient(operation, e))?;

    tracing::debug!("{} -> {}", operation, response.status());
    check_status(response, operation).await
}

async fn check_status(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, operation, &error_message(&body)))
}

pub fn status_error(status: StatusCode, operation: &str, message: &str) -> EtlError {
    match status.as_u16() {
        401 | 403 => EtlError::auth(format!("{}: {}", operation, message)),
        404 => EtlError::not_found(format!("{} ({})", operation, message)),
        408 | 429 | 500..=599 => {
            EtlError::transient(operation, format!("status {}: {}", status, message))
        }
        code => EtlError::Api {
            operation: operation.to_string(),
            status: code,
            message: message.to_string(),
        },
    }
}

pub async fn read_bytes(response: Response, operation: &str) -> Result<Vec<u8>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| EtlError::transient(operation, e))?;
    Ok(bytes.to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let bytes = read_bytes(response, operation).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Pulls the human-readable part out of Google and OAuth error bodies.
fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().chars().take(500).collect();
    };

    if let Some(message) = value.pointer("/error/message").and_then(|v| v.as_str()) {
        return message.to_string();
    }
    if let Some(description) = value.get("error_description").and_then(|v| v.as_str()) {
        return description.to_string();
    }
    if let Some(error) = value.get("error").and_then(|v| v.as_str()) {
        return error.to_string();
    }
    body.trim().chars().take(500).collect()
}
