//! HTTP client for the product analysis service
//!
//! One client implements the identity, ingredient, and packaging contracts
//! against the same base URL. The identify call carries a hard per-request
//! budget; the ingredient/packaging sub-calls rely on the transport connect
//! timeout only.

use crate::services::{transport_error, IdentityLookup, IngredientAnalysis, PackagingAnalysis};
use crate::types::{
    BarcodeLookup, IdentifiedProduct, ImageRef, IngredientDescriptions, PackagingAssessment,
    PackagingDetails, ProductIdentity, SafetyLevel, SeparatedIngredients, SeparatedPackaging,
};
use async_trait::async_trait;
use indexmap::IndexMap;
use reqwest::Client;
use scanwise_common::config::TomlConfig;
use scanwise_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct ProductPayload {
    name: String,
    #[serde(default)]
    brand: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    ingredients_list: Vec<String>,
    #[serde(default)]
    safety_score: Option<f64>,
}

impl ProductPayload {
    fn into_product(self, barcode: Option<String>) -> IdentifiedProduct {
        IdentifiedProduct {
            identity: ProductIdentity {
                name: self.name,
                brand: self.brand,
                category: self.category,
                barcode,
                image: self.image_url.map(ImageRef::Remote),
            },
            ingredients_list: self.ingredients_list,
            safety_score: self.safety_score,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BarcodeLookupPayload {
    found: bool,
    #[serde(default)]
    product: Option<ProductPayload>,
}

#[derive(Debug, Deserialize)]
struct SeparatedIngredientsPayload {
    #[serde(default)]
    harmful: Vec<String>,
    #[serde(default)]
    safe: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IngredientDescriptionsPayload {
    #[serde(default)]
    harmful: IndexMap<String, String>,
    #[serde(default)]
    safe: IndexMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SeparatedPackagingPayload {
    #[serde(default)]
    materials: Vec<String>,
    #[serde(default)]
    raw_text: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MaterialPayload {
    #[serde(default)]
    description: String,
    #[serde(default)]
    harmful: bool,
    #[serde(default)]
    health_concerns: String,
    #[serde(default)]
    environmental_impact: String,
    #[serde(default)]
    severity: Option<SafetyLevel>,
}

#[derive(Debug, Deserialize)]
struct PackagingAssessmentPayload {
    #[serde(default)]
    analysis: IndexMap<String, MaterialPayload>,
    #[serde(default)]
    overall_safety: Option<SafetyLevel>,
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Serialize)]
struct ProductContext<'a> {
    product_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    brand: Option<&'a str>,
    ingredients_list: &'a [String],
}

impl<'a> From<&'a IdentifiedProduct> for ProductContext<'a> {
    fn from(product: &'a IdentifiedProduct) -> Self {
        Self {
            product_name: &product.identity.name,
            brand: product.identity.brand.as_deref(),
            ingredients_list: &product.ingredients_list,
        }
    }
}

/// Analysis service client
pub struct AnalysisClient {
    client: Client,
    base_url: String,
    identify_timeout: Duration,
}

impl AnalysisClient {
    /// Create a client for the given base URL
    ///
    /// # Errors
    /// Returns `Error::Config` if the HTTP client cannot be built.
    pub fn new(
        base_url: String,
        identify_timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identify_timeout,
        })
    }

    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        Self::new(
            config.services.analysis_base_url.clone(),
            Duration::from_secs(config.timeouts.identify_secs),
            Duration::from_secs(config.timeouts.connect_secs),
        )
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
        stage: &'static str,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, stage, "Analysis service request");

        let mut request = self.client.post(&url).json(&body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("{} returned 404", path)));
        }
        if !status.is_success() {
            return Err(Error::Stage {
                stage,
                message: format!("{} returned status {}", path, status),
            });
        }

        response.json::<T>().await.map_err(|e| Error::Stage {
            stage,
            message: format!("Failed to parse {} response: {}", path, e),
        })
    }
}

#[async_trait]
impl IdentityLookup for AnalysisClient {
    async fn lookup_by_barcode(&self, code: &str) -> Result<BarcodeLookup> {
        let payload: BarcodeLookupPayload = self
            .post_json(
                "/v1/identify/barcode",
                json!({ "barcode": code }),
                Some(self.identify_timeout),
                "identify",
            )
            .await?;

        tracing::info!(barcode = code, found = payload.found, "Barcode lookup complete");

        Ok(BarcodeLookup {
            found: payload.found,
            product: payload
                .product
                .map(|p| p.into_product(Some(code.to_string()))),
        })
    }

    async fn identify_by_image(&self, image: &str) -> Result<IdentifiedProduct> {
        let payload: ProductPayload = self
            .post_json(
                "/v1/identify/photo",
                json!({ "image_ref": image }),
                Some(self.identify_timeout),
                "identify",
            )
            .await
            .map_err(|e| match e {
                // a 404 here means "nothing recognisable", keep it NotFound
                Error::NotFound(_) => Error::NotFound("No product recognised in image".into()),
                other => other,
            })?;

        tracing::info!(product = %payload.name, "Photo identification complete");
        Ok(payload.into_product(None))
    }
}

#[async_trait]
impl IngredientAnalysis for AnalysisClient {
    async fn separate_ingredients(
        &self,
        product: &IdentifiedProduct,
    ) -> Result<SeparatedIngredients> {
        let payload: SeparatedIngredientsPayload = self
            .post_json(
                "/v1/ingredients/separate",
                serde_json::to_value(ProductContext::from(product))
                    .map_err(|e| Error::Internal(e.to_string()))?,
                None,
                "ingredients",
            )
            .await?;

        Ok(SeparatedIngredients {
            harmful: payload.harmful,
            safe: payload.safe,
        })
    }

    async fn describe_ingredients(
        &self,
        harmful: &[String],
        safe: &[String],
    ) -> Result<IngredientDescriptions> {
        let payload: IngredientDescriptionsPayload = self
            .post_json(
                "/v1/ingredients/describe",
                json!({ "harmful": harmful, "safe": safe }),
                None,
                "ingredient_descriptions",
            )
            .await?;

        Ok(IngredientDescriptions {
            harmful: payload.harmful,
            safe: payload.safe,
        })
    }
}

#[async_trait]
impl PackagingAnalysis for AnalysisClient {
    async fn separate_packaging(
        &self,
        product: &IdentifiedProduct,
    ) -> Result<SeparatedPackaging> {
        let payload: SeparatedPackagingPayload = self
            .post_json(
                "/v1/packaging/separate",
                serde_json::to_value(ProductContext::from(product))
                    .map_err(|e| Error::Internal(e.to_string()))?,
                None,
                "packaging",
            )
            .await?;

        Ok(SeparatedPackaging {
            materials: payload.materials,
            raw_text: payload.raw_text,
            tags: payload.tags,
        })
    }

    async fn describe_packaging(
        &self,
        materials: &[String],
        context: &ProductIdentity,
    ) -> Result<PackagingAssessment> {
        let payload: PackagingAssessmentPayload = self
            .post_json(
                "/v1/packaging/describe",
                json!({
                    "materials": materials,
                    "product_name": context.name,
                    "brand": context.brand,
                }),
                None,
                "packaging_descriptions",
            )
            .await?;

        let analysis = payload
            .analysis
            .into_iter()
            .map(|(material, m)| {
                (
                    material,
                    PackagingDetails {
                        description: m.description,
                        harmful: m.harmful,
                        health_concerns: m.health_concerns,
                        environmental_impact: m.environmental_impact,
                        severity: m.severity.unwrap_or_default(),
                    },
                )
            })
            .collect();

        Ok(PackagingAssessment {
            analysis,
            overall_safety: payload.overall_safety.unwrap_or_default(),
            summary: payload.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_strips_trailing_slash() {
        let client = AnalysisClient::new(
            "https://analysis.example.com/".to_string(),
            Duration::from_secs(45),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.base_url, "https://analysis.example.com");
    }

    #[test]
    fn test_barcode_payload_parsing() {
        let payload: BarcodeLookupPayload = serde_json::from_value(json!({
            "found": true,
            "product": {
                "name": "Nutella",
                "brand": "Ferrero",
                "ingredients_list": ["sugar", "palm oil"]
            }
        }))
        .unwrap();
        assert!(payload.found);
        let product = payload.product.unwrap().into_product(Some("3017620422003".into()));
        assert_eq!(product.identity.name, "Nutella");
        assert_eq!(product.identity.barcode.as_deref(), Some("3017620422003"));
        assert_eq!(product.ingredients_list, vec!["sugar", "palm oil"]);
    }

    #[test]
    fn test_not_found_payload_has_no_product() {
        let payload: BarcodeLookupPayload =
            serde_json::from_value(json!({ "found": false })).unwrap();
        assert!(!payload.found);
        assert!(payload.product.is_none());
    }

    #[test]
    fn test_assessment_payload_defaults_severity_to_unknown() {
        let payload: PackagingAssessmentPayload = serde_json::from_value(json!({
            "analysis": { "plastic": { "description": "D" } },
            "summary": "S"
        }))
        .unwrap();
        assert!(payload.analysis["plastic"].severity.is_none());
        assert!(payload.overall_safety.is_none());
    }
}
