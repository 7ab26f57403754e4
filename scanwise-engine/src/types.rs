//! Shared types and data contracts for the scan pipeline
//!
//! These types are the explicit contracts between the pipeline stages, the
//! external collaborators, the result cache, and the history backend.
//!
//! Map fields use `IndexMap` deliberately: the report renders tag lists in
//! insertion order, and a key inserted with a placeholder description must
//! keep its position when the description fills in later.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Scan identity
// ============================================================================

/// Kind of scan, used to pick the cache collection and the Stage 1 lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    Barcode,
    Photo,
}

impl std::fmt::Display for ScanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanKind::Barcode => write!(f, "barcode"),
            ScanKind::Photo => write!(f, "photo"),
        }
    }
}

/// Identity of one scan: a barcode string or an opaque captured-image handle
///
/// Photo keys compare by handle value, never by pixel content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScanKey {
    Barcode(String),
    Photo(String),
}

impl ScanKey {
    pub fn kind(&self) -> ScanKind {
        match self {
            ScanKey::Barcode(_) => ScanKind::Barcode,
            ScanKey::Photo(_) => ScanKind::Photo,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            ScanKey::Barcode(v) | ScanKey::Photo(v) => v,
        }
    }
}

// ============================================================================
// Stage flags
// ============================================================================

/// One loading flag per pipeline stage
///
/// The run settles (and becomes persistable) when every flag is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    pub basic_loading: bool,
    pub ingredients_loading: bool,
    pub ingredient_descriptions_loading: bool,
    pub packaging_loading: bool,
    pub packaging_descriptions_loading: bool,
    pub recommendations_loading: bool,
}

impl StageFlags {
    /// All stages pending, for a fresh pipeline run
    pub fn for_fresh_run() -> Self {
        Self {
            basic_loading: true,
            ingredients_loading: true,
            ingredient_descriptions_loading: true,
            packaging_loading: true,
            packaging_descriptions_loading: true,
            recommendations_loading: true,
        }
    }

    /// Nothing pending, for a result restored from cache or history
    pub fn for_cache_restore() -> Self {
        Self {
            basic_loading: false,
            ingredients_loading: false,
            ingredient_descriptions_loading: false,
            packaging_loading: false,
            packaging_descriptions_loading: false,
            recommendations_loading: false,
        }
    }

    /// True when every stage has resolved (or degraded)
    pub fn all_clear(&self) -> bool {
        !self.basic_loading
            && !self.ingredients_loading
            && !self.ingredient_descriptions_loading
            && !self.packaging_loading
            && !self.packaging_descriptions_loading
            && !self.recommendations_loading
    }
}

// ============================================================================
// Product report
// ============================================================================

/// Overall safety verdict for a section of the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Safe,
    Caution,
    Harmful,
    #[default]
    Unknown,
}

/// Product image reference
///
/// `Local` is a capture on this device that has not been uploaded yet;
/// the persister substitutes the remote URL after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "ref", rename_all = "snake_case")]
pub enum ImageRef {
    Local(String),
    Remote(String),
}

/// Minimal product descriptor obtained from Stage 1
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductIdentity {
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub barcode: Option<String>,
    pub image: Option<ImageRef>,
}

/// Stage 1 output: identity plus the raw material later stages analyse
#[derive(Debug, Clone, Default)]
pub struct IdentifiedProduct {
    pub identity: ProductIdentity,
    /// Raw ingredient list as printed on the label (may be empty for photo
    /// scans where the label was not legible)
    pub ingredients_list: Vec<String>,
    /// Chemical-analysis safety score, when the lookup provides one
    pub safety_score: Option<f64>,
}

/// Ingredient section of the report
///
/// Keys are inserted with empty-string placeholder descriptions as soon as
/// separation resolves, so names render before explanations arrive. Keys
/// are never removed, only updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngredientReport {
    pub harmful: IndexMap<String, String>,
    pub safe: IndexMap<String, String>,
}

/// Per-material packaging assessment
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackagingDetails {
    pub description: String,
    pub harmful: bool,
    pub health_concerns: String,
    pub environmental_impact: String,
    pub severity: SafetyLevel,
}

/// Packaging section of the report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagingReport {
    pub materials: Vec<String>,
    pub analysis: IndexMap<String, PackagingDetails>,
    pub overall_safety: SafetyLevel,
    pub summary: String,
}

/// The accumulating, partially-populated product report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductViewModel {
    pub identity: ProductIdentity,
    pub ingredients: IngredientReport,
    pub packaging: PackagingReport,
    pub safety_score: Option<f64>,
}

// ============================================================================
// Recommendations
// ============================================================================

/// Curated alternative from the vetted-product catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VettedProduct {
    pub id: String,
    pub name: String,
    pub price: Option<String>,
    pub image_url: Option<String>,
    pub permalink: Option<String>,
    pub description: Option<String>,
}

/// Generated alternative suggestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiAlternative {
    pub name: String,
    pub brand: Option<String>,
    pub description: String,
    pub logo_url: Option<String>,
}

/// Safer-alternative suggestions; independent lifecycle from the report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendations {
    pub vetted_products: Vec<VettedProduct>,
    pub ai_alternatives: Vec<AiAlternative>,
}

// ============================================================================
// Cache entry
// ============================================================================

/// One cached scan result
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ScanKey,
    pub view_model: ProductViewModel,
    pub recommendations: Option<Recommendations>,
    pub inserted_at: DateTime<Utc>,
}

// ============================================================================
// Persisted record
// ============================================================================

/// Ingredient name/description pair in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientEntry {
    pub name: String,
    pub description: String,
}

/// Flattened per-material packaging entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagingEntry {
    pub material: String,
    pub description: String,
    pub harmful: bool,
    pub health_concerns: String,
    pub environmental_impact: String,
    pub severity: SafetyLevel,
}

/// Durable, backend-stored form of one completed scan
///
/// Written exactly once per pipeline run; never mutated afterward from the
/// pipeline. Array order mirrors report map insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedScanRecord {
    pub scan_type: ScanKind,
    pub product_name: String,
    pub brand: Option<String>,
    pub barcode: Option<String>,
    pub image_url: Option<String>,
    pub safe_ingredients: Vec<IngredientEntry>,
    pub harmful_ingredients: Vec<IngredientEntry>,
    pub packaging: Vec<PackagingEntry>,
    pub packaging_summary: String,
    pub packaging_safety: SafetyLevel,
    pub recommendations: Vec<AiAlternative>,
    pub safety_score: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Run state machine
// ============================================================================

/// Pipeline run state
///
/// One-way progression; `Failed` and `Persisted` are terminal. Transitions
/// are validated centrally in [`RunState::can_transition_to`] rather than
/// via scattered boolean guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Stage 1 identity lookup in flight; runs are born here
    Identifying,
    /// Identity known; enrichment branches and recommendations in flight
    Enriching,
    /// All stage flags cleared; report is complete
    Settled,
    /// Scan record written to the history backend
    Persisted,
    /// Stage 1 failed; no further stages were started
    Failed,
}

impl RunState {
    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Identifying, Enriching)
                | (Identifying, Failed)
                | (Enriching, Settled)
                | (Settled, Persisted)
        )
    }

    /// True once the run can make no further progress
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Persisted | RunState::Failed)
    }
}

/// Why a run failed, kept separate from the message so the UI can pick
/// distinct affordances (retry vs. check-your-connection)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    NetworkUnavailable,
    Other,
}

impl From<&scanwise_common::Error> for FailureKind {
    fn from(err: &scanwise_common::Error) -> Self {
        match err {
            scanwise_common::Error::NotFound(_) => FailureKind::NotFound,
            scanwise_common::Error::NetworkUnavailable(_) => FailureKind::NetworkUnavailable,
            _ => FailureKind::Other,
        }
    }
}

// ============================================================================
// Collaborator call results
// ============================================================================

/// Result of a barcode lookup
#[derive(Debug, Clone, Default)]
pub struct BarcodeLookup {
    pub found: bool,
    pub product: Option<IdentifiedProduct>,
}

/// Result of ingredient separation
#[derive(Debug, Clone, Default)]
pub struct SeparatedIngredients {
    pub harmful: Vec<String>,
    pub safe: Vec<String>,
}

/// Result of ingredient description
#[derive(Debug, Clone, Default)]
pub struct IngredientDescriptions {
    pub harmful: IndexMap<String, String>,
    pub safe: IndexMap<String, String>,
}

/// Result of packaging separation
#[derive(Debug, Clone, Default)]
pub struct SeparatedPackaging {
    pub materials: Vec<String>,
    pub raw_text: String,
    pub tags: Vec<String>,
}

/// Result of packaging description
#[derive(Debug, Clone, Default)]
pub struct PackagingAssessment {
    pub analysis: IndexMap<String, PackagingDetails>,
    pub overall_safety: SafetyLevel,
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_run_flags_all_pending() {
        let flags = StageFlags::for_fresh_run();
        assert!(!flags.all_clear());
        assert!(flags.basic_loading);
        assert!(flags.recommendations_loading);
    }

    #[test]
    fn test_cache_restore_flags_all_clear() {
        assert!(StageFlags::for_cache_restore().all_clear());
    }

    #[test]
    fn test_run_state_progression() {
        use RunState::*;
        assert!(Identifying.can_transition_to(Enriching));
        assert!(Identifying.can_transition_to(Failed));
        assert!(Enriching.can_transition_to(Settled));
        assert!(Settled.can_transition_to(Persisted));
    }

    #[test]
    fn test_run_state_rejects_skips_and_regressions() {
        use RunState::*;
        assert!(!Identifying.can_transition_to(Settled));
        assert!(!Enriching.can_transition_to(Identifying));
        assert!(!Settled.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Identifying));
        assert!(!Persisted.can_transition_to(Settled));
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Persisted.is_terminal());
        assert!(!RunState::Settled.is_terminal());
    }

    #[test]
    fn test_scan_key_kind_and_equality() {
        let a = ScanKey::Photo("capture-001".to_string());
        let b = ScanKey::Photo("capture-001".to_string());
        let c = ScanKey::Barcode("capture-001".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.kind(), ScanKind::Photo);
        assert_eq!(c.kind(), ScanKind::Barcode);
    }

    #[test]
    fn test_safety_level_default_is_unknown() {
        assert_eq!(SafetyLevel::default(), SafetyLevel::Unknown);
        let report = PackagingReport::default();
        assert_eq!(report.overall_safety, SafetyLevel::Unknown);
    }
}
