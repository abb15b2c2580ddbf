//! REST sink for Firebase-RTDB-style document stores.
//!
//! Each put becomes `PUT {base_url}/{path}.json`, optionally authenticated
//! with an `auth` query parameter.

use crate::error::{Result, SinkError};
use crate::{validate_path, Sink};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// Configuration for [`RestSink`].
#[derive(Debug, Clone)]
pub struct RestSinkConfig {
    /// Base URL of the database, e.g. `https://example.firebaseio.com`
    pub base_url: String,

    /// Optional auth token sent as `?auth=`
    pub auth_token: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl RestSinkConfig {
    /// Config with a base URL and default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
            timeout: Duration::from_secs(5),
        }
    }

    /// Set the auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// HTTP key-path sink.
pub struct RestSink {
    client: Client,
    config: RestSinkConfig,
}

impl RestSink {
    /// Build the HTTP client.
    pub fn new(config: RestSinkConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(SinkError::InvalidInput("empty REST base URL".into()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client, config })
    }

    /// URL a record at `path` is written to.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}.json", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Sink for RestSink {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn put(&self, path: &str, record: &Value) -> Result<()> {
        validate_path(path)?;

        let mut request = self.client.put(self.url_for(path)).json(record);
        if let Some(token) = &self.config.auth_token {
            request = request.query(&[("auth", token)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        tracing::trace!(path = %path, status = status.as_u16(), "REST put ok");
        Ok(())
    }
}
