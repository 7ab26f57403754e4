//! Rebuilding a report from a persisted history record
//!
//! The inverse of [`crate::format::record_from_report`], as far as the
//! record allows: placeholder descriptions restore as placeholders, vetted
//! catalog picks are not stored and come back empty.

use crate::pipeline::state::ScanSnapshot;
use crate::types::{
    ImageRef, PersistedScanRecord, ProductIdentity, ProductViewModel, Recommendations, RunState,
    ScanKey, ScanKind, StageFlags,
};
use indexmap::IndexMap;
use uuid::Uuid;

/// Rebuild the report view model from a durable record
pub fn view_model_from_record(record: &PersistedScanRecord) -> ProductViewModel {
    let mut view_model = ProductViewModel {
        identity: ProductIdentity {
            name: record.product_name.clone(),
            brand: record.brand.clone(),
            category: None,
            barcode: record.barcode.clone(),
            image: record.image_url.clone().map(ImageRef::Remote),
        },
        safety_score: record.safety_score,
        ..Default::default()
    };

    for entry in &record.harmful_ingredients {
        view_model
            .ingredients
            .harmful
            .insert(entry.name.clone(), entry.description.clone());
    }
    for entry in &record.safe_ingredients {
        view_model
            .ingredients
            .safe
            .insert(entry.name.clone(), entry.description.clone());
    }

    let mut analysis = IndexMap::new();
    for entry in &record.packaging {
        view_model.packaging.materials.push(entry.material.clone());
        analysis.insert(
            entry.material.clone(),
            crate::types::PackagingDetails {
                description: entry.description.clone(),
                harmful: entry.harmful,
                health_concerns: entry.health_concerns.clone(),
                environmental_impact: entry.environmental_impact.clone(),
                severity: entry.severity,
            },
        );
    }
    view_model.packaging.analysis = analysis;
    view_model.packaging.summary = record.packaging_summary.clone();
    view_model.packaging.overall_safety = record.packaging_safety;

    view_model
}

/// Build a settled, nothing-loading snapshot from a durable record
///
/// Used when opening an old scan from history; behaves exactly like a cache
/// hit.
pub fn snapshot_from_record(record: &PersistedScanRecord) -> ScanSnapshot {
    let key = match (&record.scan_type, &record.barcode) {
        (ScanKind::Barcode, Some(code)) => ScanKey::Barcode(code.clone()),
        // photo captures have no durable key; the record's image stands in
        _ => ScanKey::Photo(record.image_url.clone().unwrap_or_default()),
    };

    let recommendations = if record.recommendations.is_empty() {
        None
    } else {
        Some(Recommendations {
            vetted_products: Vec::new(),
            ai_alternatives: record.recommendations.clone(),
        })
    };

    ScanSnapshot {
        run_id: Uuid::new_v4(),
        key,
        state: RunState::Settled,
        flags: StageFlags::for_cache_restore(),
        view_model: view_model_from_record(record),
        recommendations,
        failure: None,
        error: None,
    }
}
