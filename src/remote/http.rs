//! HTTP client for the glowlog sync server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::time::Duration;

use super::{BatchRequest, QueryResponse, RemoteError, RemoteStore};
use crate::config::SyncConfig;
use crate::models::ReadingKind;
use crate::sync::Connectivity;

/// [`RemoteStore`] backed by a `glowlog-server` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpRemoteStore {
    pub fn new(
        server_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(server_url),
            api_key: api_key.into(),
        })
    }

    /// Creates a client from config.
    ///
    /// Returns an error if the server URL or API key is missing.
    pub fn from_config(config: &SyncConfig) -> Result<Self, RemoteError> {
        let server_url = config
            .server_url
            .as_deref()
            .ok_or(RemoteError::NotConfigured)?;
        let api_key = config.api_key.clone().ok_or(RemoteError::NotConfigured)?;

        Self::new(
            server_url,
            api_key,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the server answers its health endpoint.
    pub async fn health(&self) -> Result<(), RemoteError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    fn collection_url(&self, user_id: &str, kind: ReadingKind) -> String {
        format!(
            "{}/v1/users/{}/{}",
            self.base_url,
            urlencoding::encode(user_id),
            kind.collection()
        )
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn commit(
        &self,
        user_id: &str,
        kind: ReadingKind,
        documents: Vec<serde_json::Value>,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.collection_url(user_id, kind))
            .bearer_auth(&self.api_key)
            .json(&BatchRequest { documents })
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn query_changed(
        &self,
        user_id: &str,
        kind: ReadingKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<serde_json::Value>, RemoteError> {
        let response = self
            .client
            .get(self.collection_url(user_id, kind))
            .bearer_auth(&self.api_key)
            .query(&[("since", since.timestamp_millis())])
            .send()
            .await
            .map_err(transport_error)?;

        let body: QueryResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(body.documents)
    }
}

#[async_trait]
impl Connectivity for HttpRemoteStore {
    async fn is_online(&self) -> bool {
        self.health().await.is_ok()
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(RemoteError::Unauthorized);
    }

    let message = response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());

    Err(RemoteError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Adds `http://` to bare hosts and drops a trailing slash.
fn normalize_base_url(server_url: &str) -> String {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}
