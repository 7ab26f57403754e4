//! Pure formatting and normalisation helpers
//!
//! No side effects and no async; everything here is unit-testable in
//! isolation from the pipeline.

use crate::types::{
    IngredientEntry, PackagingDetails, PackagingEntry, PersistedScanRecord, ProductViewModel,
    Recommendations, ScanKind,
};
use indexmap::IndexMap;

/// Sentinel the analysis service returns when a material has no known
/// health concerns; the rendered text omits the line entirely
pub const NO_HEALTH_CONCERNS: &str = "None identified";

/// Format a raw tag name for display: underscores become spaces, each word
/// is title-cased
///
/// `"plastic_bottle"` → `"Plastic Bottle"`
pub fn format_tag_name(raw: &str) -> String {
    raw.split('_')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the rendered description text for one packaging material
///
/// Description paragraph, then a Health Concerns line (omitted when the
/// value is the "None identified" sentinel or empty), then an Environmental
/// Impact line (omitted when empty).
pub fn build_packaging_description_text(details: &PackagingDetails) -> String {
    let mut text = details.description.clone();

    let mut extras = Vec::new();
    if !details.health_concerns.is_empty() && details.health_concerns != NO_HEALTH_CONCERNS {
        extras.push(format!("Health Concerns: {}", details.health_concerns));
    }
    if !details.environmental_impact.is_empty() {
        extras.push(format!(
            "Environmental Impact: {}",
            details.environmental_impact
        ));
    }

    if !extras.is_empty() {
        text.push_str("\n\n");
        text.push_str(&extras.join("\n"));
    }
    text
}

/// Insert names into a report map with empty placeholder descriptions
///
/// Existing keys keep their current value; the key set never shrinks.
pub fn insert_placeholders(map: &mut IndexMap<String, String>, names: &[String]) {
    for name in names {
        map.entry(name.clone()).or_default();
    }
}

/// Overwrite placeholder descriptions with fetched ones
///
/// Keys missing from `descriptions` keep their placeholders; keys only in
/// `descriptions` are appended rather than dropped.
pub fn fill_descriptions(map: &mut IndexMap<String, String>, descriptions: &IndexMap<String, String>) {
    for (name, description) in descriptions {
        map.insert(name.clone(), description.clone());
    }
}

/// Normalise a completed report into the durable record shape
///
/// Map iteration order is insertion order, so the persisted arrays mirror
/// the order tags rendered in.
pub fn record_from_report(
    scan_type: ScanKind,
    view_model: &ProductViewModel,
    recommendations: Option<&Recommendations>,
) -> PersistedScanRecord {
    let ingredient_entries = |map: &IndexMap<String, String>| {
        map.iter()
            .map(|(name, description)| IngredientEntry {
                name: name.clone(),
                description: description.clone(),
            })
            .collect::<Vec<_>>()
    };

    let packaging = view_model
        .packaging
        .analysis
        .iter()
        .map(|(material, details)| PackagingEntry {
            material: material.clone(),
            description: details.description.clone(),
            harmful: details.harmful,
            health_concerns: details.health_concerns.clone(),
            environmental_impact: details.environmental_impact.clone(),
            severity: details.severity,
        })
        .collect();

    let image_url = match &view_model.identity.image {
        Some(crate::types::ImageRef::Remote(url)) => Some(url.clone()),
        Some(crate::types::ImageRef::Local(path)) => Some(path.clone()),
        None => None,
    };

    PersistedScanRecord {
        scan_type,
        product_name: view_model.identity.name.clone(),
        brand: view_model.identity.brand.clone(),
        barcode: view_model.identity.barcode.clone(),
        image_url,
        safe_ingredients: ingredient_entries(&view_model.ingredients.safe),
        harmful_ingredients: ingredient_entries(&view_model.ingredients.harmful),
        packaging,
        packaging_summary: view_model.packaging.summary.clone(),
        packaging_safety: view_model.packaging.overall_safety,
        recommendations: recommendations
            .map(|r| r.ai_alternatives.clone())
            .unwrap_or_default(),
        safety_score: view_model.safety_score,
        recorded_at: chrono::Utc::now(),
    }
}
