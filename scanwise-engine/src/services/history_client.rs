//! HTTP client for the scan-history backend, plus the token auth session

use crate::services::{transport_error, AuthSession, ScanHistoryBackend};
use crate::types::PersistedScanRecord;
use async_trait::async_trait;
use reqwest::Client;
use scanwise_common::config::TomlConfig;
use scanwise_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ScanPage {
    #[serde(default)]
    records: Vec<PersistedScanRecord>,
}

/// Scan-history backend client
pub struct HistoryClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HistoryClient {
    pub fn new(
        base_url: String,
        api_token: Option<String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::new(
            config.services.history_base_url.clone(),
            config.services.api_token.clone(),
            Duration::from_secs(config.timeouts.connect_secs),
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ScanHistoryBackend for HistoryClient {
    async fn save_scan_result(&self, record: &PersistedScanRecord) -> Result<()> {
        let url = format!("{}/v1/scans", self.base_url);

        let response = self
            .authorize(self.client.post(&url))
            .json(record)
            .send()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Persistence(format!(
                "History backend returned status {}",
                status
            )));
        }

        tracing::info!(product = %record.product_name, "Scan record persisted");
        Ok(())
    }

    async fn get_scan_results(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Vec<PersistedScanRecord>> {
        let url = format!(
            "{}/v1/scans?page={}&limit={}",
            self.base_url, page, limit
        );

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "History backend returned status {}",
                status
            )));
        }

        let payload: ScanPage = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse scan history: {}", e)))?;
        Ok(payload.records)
    }
}

/// Auth session backed by the presence of a configured API token
pub struct TokenSession {
    token: Option<String>,
}

impl TokenSession {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }

    pub fn from_config(config: &TomlConfig) -> Self {
        Self::new(config.services.api_token.clone())
    }
}

#[async_trait]
impl AuthSession for TokenSession {
    async fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_session_authentication() {
        assert!(!TokenSession::new(None).is_authenticated().await);
        assert!(!TokenSession::new(Some("  ".into())).is_authenticated().await);
        assert!(TokenSession::new(Some("tok".into())).is_authenticated().await);
    }
}
