//! HTTP client implementation

use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::errors::ProvisionerError;

/// Header carrying the Canvas API token
pub const TOKEN_HEADER: &str = "x-canvas-token";

/// HTTP client for the Canvas API
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: SecretString,
}

impl HttpClient {
    /// Create a new HTTP client; every request is bounded by `timeout`
    pub fn new(base_url: &str, token: SecretString, timeout: Duration) -> Result<Self, ProvisionerError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Send a PATCH and return the status and body, whatever the status
    pub async fn send_patch<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(StatusCode, String), ProvisionerError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("PATCH {}", url);

        let response = self
            .client
            .patch(&url)
            .header(TOKEN_HEADER, self.token.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Ok((status, body))
    }
}
