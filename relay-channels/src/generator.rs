//! Text-generation client.
//!
//! The generator is addressed by the prompt alone: the whole prompt is
//! URL-encoded into the request path and the response body is the generated
//! continuation as plain text.

use async_trait::async_trait;
use relay_common::config::GeneratorConfig;
use relay_common::{Error, Result};
use std::time::Duration;

/// Produces a continuation for a flattened conversation prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply for `prompt`.
    ///
    /// Transport problems, timeouts and non-success statuses are errors.
    /// Callers do not retry.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// Client for Pollinations-style text endpoints (`GET {endpoint}/{prompt}`).
pub struct PollinationsClient {
    client: reqwest::Client,
    endpoint: String,
}

impl PollinationsClient {
    /// Create a client with the given request timeout.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self::with_timeouts(endpoint, timeout, timeout.min(Duration::from_secs(10)))
    }

    /// Create a client from configuration.
    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::with_timeouts(
            config.endpoint.as_str(),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.connect_timeout_secs),
        )
    }

    /// Create a client with separate request and connect timeouts.
    pub fn with_timeouts(endpoint: impl Into<String>, timeout: Duration, connect_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build the request URL for a prompt.
    pub fn request_url(&self, prompt: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(prompt.as_bytes()).collect();
        format!("{}/{}", self.endpoint, encoded)
    }
}

#[async_trait]
impl TextGenerator for PollinationsClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = self.request_url(prompt);
        let started = std::time::Instant::now();

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::External(format!("failed to make API request: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::External(format!("failed to read response body: {e}"))
            }
        })?;

        tracing::debug!(
            duration_ms = started.elapsed().as_millis() as u64,
            body = %body,
            "Generator responded"
        );

        Ok(body.trim().to_string())
    }
}
