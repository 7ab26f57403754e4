//! HTTP multipart image uploader
//!
//! Uploads a locally-captured product image and returns its remote URL.
//! Upload failure is non-fatal for the caller, which falls back to the
//! local reference.

use crate::services::ImageUpload;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use scanwise_common::config::TomlConfig;
use scanwise_common::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct UploadPayload {
    url: String,
}

/// Image upload client for the history backend's media endpoint
pub struct HttpImageUploader {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpImageUploader {
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
}

#[async_trait]
impl ImageUpload for HttpImageUploader {
    async fn upload(&self, local_path: &str) -> Result<String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| Error::Upload(format!("Read {} failed: {}", local_path, e)))?;

        let file_name = Path::new(local_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture.jpg".to_string());

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));

        let url = format!("{}/v1/uploads", self.base_url);
        let mut request = self.client.post(&url).multipart(form);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Upload(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upload(format!(
                "Upload endpoint returned status {}",
                status
            )));
        }

        let payload: UploadPayload = response
            .json()
            .await
            .map_err(|e| Error::Upload(format!("Failed to parse upload response: {}", e)))?;

        tracing::info!(local = local_path, remote = %payload.url, "Image uploaded");
        Ok(payload.url)
    }
}
