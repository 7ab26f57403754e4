//! HTTP client for safer-alternative recommendations
//!
//! Best effort: the caller maps any failure to "no recommendations
//! available", never a blocking error.

use crate::services::{transport_error, RecommendationService};
use crate::types::{AiAlternative, ProductIdentity, Recommendations, VettedProduct};
use async_trait::async_trait;
use reqwest::Client;
use scanwise_common::config::TomlConfig;
use scanwise_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RecommendationsPayload {
    #[serde(default)]
    vetted_products: Vec<VettedProduct>,
    #[serde(default)]
    ai_alternatives: Vec<AiAlternative>,
}

/// Recommendation service client
pub struct RecommendationClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl RecommendationClient {
    pub fn new(base_url: String, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::new(
            config.services.analysis_base_url.clone(),
            Duration::from_secs(config.timeouts.recommendation_secs),
            Duration::from_secs(config.timeouts.connect_secs),
        )
    }
}

#[async_trait]
impl RecommendationService for RecommendationClient {
    async fn get_recommendations(&self, identity: &ProductIdentity) -> Result<Recommendations> {
        let url = format!("{}/v1/recommendations", self.base_url);
        tracing::debug!(product = %identity.name, "Fetching recommendations");

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&json!({
                "product_name": identity.name,
                "brand": identity.brand,
                "category": identity.category,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "Recommendation service returned status {}",
                status
            )));
        }

        let payload: RecommendationsPayload = response
            .json()
            .await
            .map_err(|e| Error::Http(format!("Failed to parse recommendations: {}", e)))?;

        tracing::info!(
            vetted = payload.vetted_products.len(),
            alternatives = payload.ai_alternatives.len(),
            "Recommendations fetched"
        );

        Ok(Recommendations {
            vetted_products: payload.vetted_products,
            ai_alternatives: payload.ai_alternatives,
        })
    }
}
