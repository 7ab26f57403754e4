//! Single-owner scan run state
//!
//! Every stage callback funnels its result through [`StageUpdate`] messages
//! into one reducer, so independently-resolving branches can never race on
//! the shared report or lose updates. The reducer applies each update as a
//! merge against the latest state and hands back the events to broadcast.
//!
//! Report map invariants enforced here:
//! - separation inserts names with empty placeholder descriptions, so tags
//!   render before explanations arrive
//! - a key, once inserted, is only ever updated, never removed

use crate::format::{fill_descriptions, insert_placeholders};
use crate::types::{
    CacheEntry, FailureKind, IdentifiedProduct, IngredientDescriptions, PackagingAssessment,
    ProductViewModel, Recommendations, RunState, ScanKey, StageFlags,
};
use scanwise_common::events::{ReportSection, ScanEvent};
use tracing::warn;
use uuid::Uuid;

/// One stage result, delivered as a message to the reducer
#[derive(Debug)]
pub enum StageUpdate {
    /// Stage 1 succeeded
    IdentityResolved { product: IdentifiedProduct },
    /// Stage 1 failed; the run is over
    IdentityFailed { kind: FailureKind, message: String },
    /// Stage 2a: names partitioned into harmful/safe
    IngredientsSeparated { harmful: Vec<String>, safe: Vec<String> },
    /// Stage 2b: explanation text for the separated names
    IngredientDescriptionsReady { descriptions: IngredientDescriptions },
    /// Stage 2 sub-call failed; the section degrades, siblings continue
    IngredientBranchFailed { during_describe: bool, message: String },
    /// Stage 3a: packaging materials determined
    PackagingSeparated { materials: Vec<String> },
    /// Stage 3b: per-material assessments and overall verdict
    PackagingDescriptionsReady { assessment: PackagingAssessment },
    /// Stage 3 sub-call failed
    PackagingBranchFailed { during_describe: bool, message: String },
    /// Recommendation fetch finished (None means none available)
    RecommendationsResolved { recommendations: Option<Recommendations> },
    /// Background persistence finished
    PersistOutcome { success: bool },
}

/// Complete observable state of one pipeline run
///
/// Published through a watch channel after every applied update; the UI
/// renders from this and nothing else.
#[derive(Debug, Clone)]
pub struct ScanSnapshot {
    pub run_id: Uuid,
    pub key: ScanKey,
    pub state: RunState,
    pub flags: StageFlags,
    pub view_model: ProductViewModel,
    pub recommendations: Option<Recommendations>,
    pub failure: Option<FailureKind>,
    pub error: Option<String>,
}

impl ScanSnapshot {
    /// Fresh snapshot for a run about to identify
    pub fn for_fresh_run(run_id: Uuid, key: ScanKey) -> Self {
        Self {
            run_id,
            key,
            state: RunState::Identifying,
            flags: StageFlags::for_fresh_run(),
            view_model: ProductViewModel::default(),
            recommendations: None,
            failure: None,
            error: None,
        }
    }

    /// Snapshot restored from a cache entry; nothing is loading
    pub fn from_cache_entry(entry: &CacheEntry) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            key: entry.key.clone(),
            state: RunState::Settled,
            flags: StageFlags::for_cache_restore(),
            view_model: entry.view_model.clone(),
            recommendations: entry.recommendations.clone(),
            failure: None,
            error: None,
        }
    }

    pub fn to_cache_entry(&self) -> CacheEntry {
        CacheEntry {
            key: self.key.clone(),
            view_model: self.view_model.clone(),
            recommendations: self.recommendations.clone(),
            inserted_at: chrono::Utc::now(),
        }
    }

    /// True when the run can publish nothing further
    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Reducer owning the state of one pipeline run
#[derive(Debug)]
pub struct ScanReducer {
    snapshot: ScanSnapshot,
}

impl ScanReducer {
    pub fn new(run_id: Uuid, key: ScanKey) -> Self {
        Self {
            snapshot: ScanSnapshot::for_fresh_run(run_id, key),
        }
    }

    pub fn snapshot(&self) -> &ScanSnapshot {
        &self.snapshot
    }

    /// Apply one stage update, returning the events to broadcast
    ///
    /// Updates arriving after a terminal state are dropped; that is the
    /// late-result guard for cancelled or failed runs.
    pub fn apply(&mut self, update: StageUpdate) -> Vec<ScanEvent> {
        if self.snapshot.state.is_terminal() {
            warn!(run_id = %self.snapshot.run_id, ?update, "Dropping update for finished run");
            return Vec::new();
        }

        let run_id = self.snapshot.run_id;
        let mut events = Vec::new();

        match update {
            StageUpdate::IdentityResolved { product } => {
                self.snapshot.view_model.identity = product.identity;
                self.snapshot.view_model.safety_score = product.safety_score;
                self.snapshot.flags.basic_loading = false;
                self.transition(RunState::Enriching);
                events.push(ScanEvent::IdentityResolved {
                    run_id,
                    product_name: self.snapshot.view_model.identity.name.clone(),
                });
            }

            StageUpdate::IdentityFailed { kind, message } => {
                self.snapshot.failure = Some(kind);
                self.snapshot.error = Some(message.clone());
                // nothing else will load; stop every spinner
                self.snapshot.flags = StageFlags::for_cache_restore();
                self.transition(RunState::Failed);
                events.push(ScanEvent::RunFailed {
                    run_id,
                    error: message,
                });
            }

            StageUpdate::IngredientsSeparated { harmful, safe } => {
                insert_placeholders(&mut self.snapshot.view_model.ingredients.harmful, &harmful);
                insert_placeholders(&mut self.snapshot.view_model.ingredients.safe, &safe);
                self.snapshot.flags.ingredients_loading = false;
                events.push(ScanEvent::SectionSeparated {
                    run_id,
                    section: ReportSection::Ingredients,
                    item_count: harmful.len() + safe.len(),
                });
            }

            StageUpdate::IngredientDescriptionsReady { descriptions } => {
                fill_descriptions(
                    &mut self.snapshot.view_model.ingredients.harmful,
                    &descriptions.harmful,
                );
                fill_descriptions(
                    &mut self.snapshot.view_model.ingredients.safe,
                    &descriptions.safe,
                );
                self.snapshot.flags.ingredient_descriptions_loading = false;
                events.push(ScanEvent::SectionDescribed {
                    run_id,
                    section: ReportSection::Ingredients,
                });
            }

            StageUpdate::IngredientBranchFailed {
                during_describe,
                message,
            } => {
                // placeholders (if any) stay; the section renders names
                // without explanations instead of an error
                if !during_describe {
                    self.snapshot.flags.ingredients_loading = false;
                }
                self.snapshot.flags.ingredient_descriptions_loading = false;
                events.push(ScanEvent::SectionFailed {
                    run_id,
                    section: ReportSection::Ingredients,
                    error: message,
                });
            }

            StageUpdate::PackagingSeparated { materials } => {
                for material in &materials {
                    self.snapshot
                        .view_model
                        .packaging
                        .analysis
                        .entry(material.clone())
                        .or_default();
                }
                self.snapshot.view_model.packaging.materials = materials;
                self.snapshot.flags.packaging_loading = false;
                events.push(ScanEvent::SectionSeparated {
                    run_id,
                    section: ReportSection::Packaging,
                    item_count: self.snapshot.view_model.packaging.materials.len(),
                });
            }

            StageUpdate::PackagingDescriptionsReady { assessment } => {
                for (material, details) in assessment.analysis {
                    self.snapshot
                        .view_model
                        .packaging
                        .analysis
                        .insert(material, details);
                }
                self.snapshot.view_model.packaging.overall_safety = assessment.overall_safety;
                self.snapshot.view_model.packaging.summary = assessment.summary;
                self.snapshot.flags.packaging_descriptions_loading = false;
                events.push(ScanEvent::SectionDescribed {
                    run_id,
                    section: ReportSection::Packaging,
                });
            }

            StageUpdate::PackagingBranchFailed {
                during_describe,
                message,
            } => {
                if !during_describe {
                    self.snapshot.flags.packaging_loading = false;
                }
                self.snapshot.flags.packaging_descriptions_loading = false;
                events.push(ScanEvent::SectionFailed {
                    run_id,
                    section: ReportSection::Packaging,
                    error: message,
                });
            }

            StageUpdate::RecommendationsResolved { recommendations } => {
                // never downgrade an existing value to None
                if self.snapshot.recommendations.is_none() {
                    if let Some(recommendations) = recommendations {
                        events.push(ScanEvent::RecommendationsReady {
                            run_id,
                            vetted: recommendations.vetted_products.len(),
                            alternatives: recommendations.ai_alternatives.len(),
                        });
                        self.snapshot.recommendations = Some(recommendations);
                    }
                }
                self.snapshot.flags.recommendations_loading = false;
            }

            StageUpdate::PersistOutcome { success } => {
                if success && self.transition(RunState::Persisted) {
                    events.push(ScanEvent::ResultPersisted { run_id });
                }
            }
        }

        if self.snapshot.state == RunState::Enriching && self.snapshot.flags.all_clear() {
            self.transition(RunState::Settled);
            events.push(ScanEvent::RunSettled { run_id });
        }

        events
    }

    /// Centrally-validated state transition
    ///
    /// An illegal transition is logged and ignored rather than applied.
    fn transition(&mut self, next: RunState) -> bool {
        if self.snapshot.state.can_transition_to(next) {
            self.snapshot.state = next;
            true
        } else {
            warn!(
                run_id = %self.snapshot.run_id,
                from = ?self.snapshot.state,
                to = ?next,
                "Ignoring invalid run state transition"
            );
            false
        }
    }
}
