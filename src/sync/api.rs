use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

/// The one remote call the tracker consumes. Kept as a raw JSON object so
/// server-side fields the local schema doesn't know yet still get written
/// through to the summary file.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryApi: Send + Sync {
    async fn fetch_session_summary(&self) -> Result<Value>;
}

pub struct HttpSummaryApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSummaryApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SummaryApi for HttpSummaryApi {
    async fn fetch_session_summary(&self) -> Result<Value> {
        let url = format!(
            "{}/api/v1/user/session_summary",
            self.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Session summary request failed")?
            .error_for_status()
            .context("Session summary request was rejected")?;
        Ok(response.json().await?)
    }
}
