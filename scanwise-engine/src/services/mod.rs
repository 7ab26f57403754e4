//! External collaborator contracts
//!
//! The pipeline core treats everything beyond these traits as a black box:
//! the analysis service, the recommendation catalog, the image store, the
//! history backend, and the auth session. HTTP implementations live in the
//! sibling modules; tests substitute in-memory fakes.

use crate::types::{
    BarcodeLookup, IdentifiedProduct, IngredientDescriptions, PackagingAssessment,
    PersistedScanRecord, ProductIdentity, Recommendations, SeparatedIngredients,
    SeparatedPackaging,
};
use async_trait::async_trait;
use scanwise_common::Result;

pub mod analysis_client;
pub mod history_client;
pub mod image_uploader;
pub mod recommendation_client;

pub use analysis_client::AnalysisClient;
pub use history_client::{HistoryClient, TokenSession};
pub use image_uploader::HttpImageUploader;
pub use recommendation_client::RecommendationClient;

/// Stage 1: resolve a scan key into a product
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Look up a product by barcode
    ///
    /// `found: false` is a normal outcome, not an error.
    async fn lookup_by_barcode(&self, code: &str) -> Result<BarcodeLookup>;

    /// Identify a product from a captured image handle
    ///
    /// Returns `Error::NotFound` when nothing recognisable is in frame.
    async fn identify_by_image(&self, image: &str) -> Result<IdentifiedProduct>;
}

/// Stage 2: ingredient separation and description
#[async_trait]
pub trait IngredientAnalysis: Send + Sync {
    /// Partition the product's ingredients into harmful and safe name lists
    async fn separate_ingredients(
        &self,
        product: &IdentifiedProduct,
    ) -> Result<SeparatedIngredients>;

    /// Fetch explanation text for previously separated names
    async fn describe_ingredients(
        &self,
        harmful: &[String],
        safe: &[String],
    ) -> Result<IngredientDescriptions>;
}

/// Stage 3: packaging separation and description
#[async_trait]
pub trait PackagingAnalysis: Send + Sync {
    /// Determine the packaging materials of the product
    async fn separate_packaging(&self, product: &IdentifiedProduct)
        -> Result<SeparatedPackaging>;

    /// Fetch per-material assessments plus an overall verdict
    async fn describe_packaging(
        &self,
        materials: &[String],
        context: &ProductIdentity,
    ) -> Result<PackagingAssessment>;
}

/// Safer-alternative suggestions, independent of the staged pipeline
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn get_recommendations(&self, identity: &ProductIdentity) -> Result<Recommendations>;
}

/// Upload of a locally-captured image, returning its remote URL
#[async_trait]
pub trait ImageUpload: Send + Sync {
    async fn upload(&self, local_path: &str) -> Result<String>;
}

/// Durable scan history backend
#[async_trait]
pub trait ScanHistoryBackend: Send + Sync {
    async fn save_scan_result(&self, record: &PersistedScanRecord) -> Result<()>;

    async fn get_scan_results(&self, page: u32, limit: u32)
        -> Result<Vec<PersistedScanRecord>>;
}

/// Authentication state, consulted by the persister only
#[async_trait]
pub trait AuthSession: Send + Sync {
    async fn is_authenticated(&self) -> bool;
}

/// Map a reqwest transport failure onto the common taxonomy
///
/// Connect and timeout failures are connectivity problems; anything else
/// goes through keyword classification of the message.
pub(crate) fn transport_error(err: reqwest::Error) -> scanwise_common::Error {
    if err.is_connect() || err.is_timeout() {
        scanwise_common::Error::NetworkUnavailable(err.to_string())
    } else {
        scanwise_common::Error::from_transport(err.to_string())
    }
}
