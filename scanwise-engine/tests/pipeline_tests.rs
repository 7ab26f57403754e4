//! End-to-end pipeline tests with in-memory collaborators

use async_trait::async_trait;
use indexmap::IndexMap;
use scanwise_common::{Error, Result};
use scanwise_engine::cache::ScanCache;
use scanwise_engine::pipeline::{Collaborators, PipelineConfig, StageRunner};
use scanwise_engine::services::{
    AuthSession, IdentityLookup, ImageUpload, IngredientAnalysis, PackagingAnalysis,
    RecommendationService, ScanHistoryBackend,
};
use scanwise_engine::types::{
    BarcodeLookup, FailureKind, IdentifiedProduct, IngredientDescriptions, PackagingAssessment,
    PackagingDetails, PersistedScanRecord, ProductIdentity, Recommendations, RunState, ScanKey,
    ScanKind, SafetyLevel, SeparatedIngredients, SeparatedPackaging, VettedProduct,
};
use scanwise_engine::{ScanEngine, ScanOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

const NUTELLA_BARCODE: &str = "3017620422003";

fn nutella() -> IdentifiedProduct {
    IdentifiedProduct {
        identity: ProductIdentity {
            name: "Nutella".to_string(),
            brand: Some("Ferrero".to_string()),
            category: Some("spreads".to_string()),
            barcode: Some(NUTELLA_BARCODE.to_string()),
            image: None,
        },
        ingredients_list: vec![
            "sugar".to_string(),
            "palm oil".to_string(),
            "hazelnuts".to_string(),
        ],
        safety_score: Some(31.0),
    }
}

/// Scripted collaborator set; per-call failure toggles drive each scenario
#[derive(Default)]
struct FakeBackend {
    barcode_found: bool,
    fail_identify_network: bool,
    fail_separate_ingredients: bool,
    fail_describe_ingredients: bool,
    fail_describe_packaging: bool,
    fail_recommendations: bool,
    fail_history_write: bool,
    authenticated: bool,
    saved: Mutex<Vec<PersistedScanRecord>>,
    save_calls: AtomicUsize,
}

impl FakeBackend {
    fn happy() -> Self {
        Self {
            barcode_found: true,
            authenticated: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl IdentityLookup for FakeBackend {
    async fn lookup_by_barcode(&self, code: &str) -> Result<BarcodeLookup> {
        if self.fail_identify_network {
            return Err(Error::NetworkUnavailable("connection refused".to_string()));
        }
        if self.barcode_found && code == NUTELLA_BARCODE {
            Ok(BarcodeLookup {
                found: true,
                product: Some(nutella()),
            })
        } else {
            Ok(BarcodeLookup {
                found: false,
                product: None,
            })
        }
    }

    async fn identify_by_image(&self, _image: &str) -> Result<IdentifiedProduct> {
        Ok(nutella())
    }
}

#[async_trait]
impl IngredientAnalysis for FakeBackend {
    async fn separate_ingredients(
        &self,
        _product: &IdentifiedProduct,
    ) -> Result<SeparatedIngredients> {
        if self.fail_separate_ingredients {
            return Err(Error::Http("separation failed".to_string()));
        }
        Ok(SeparatedIngredients {
            harmful: vec!["palm oil".to_string()],
            safe: vec!["sugar".to_string(), "hazelnuts".to_string()],
        })
    }

    async fn describe_ingredients(
        &self,
        harmful: &[String],
        safe: &[String],
    ) -> Result<IngredientDescriptions> {
        if self.fail_describe_ingredients {
            return Err(Error::Http("description failed".to_string()));
        }
        let mut descriptions = IngredientDescriptions::default();
        for name in harmful {
            descriptions
                .harmful
                .insert(name.clone(), format!("{} is worth limiting", name));
        }
        for name in safe {
            descriptions
                .safe
                .insert(name.clone(), format!("{} is fine", name));
        }
        Ok(descriptions)
    }
}

#[async_trait]
impl PackagingAnalysis for FakeBackend {
    async fn separate_packaging(
        &self,
        _product: &IdentifiedProduct,
    ) -> Result<SeparatedPackaging> {
        Ok(SeparatedPackaging {
            materials: vec!["glass_jar".to_string(), "plastic_lid".to_string()],
            raw_text: String::new(),
            tags: vec![],
        })
    }

    async fn describe_packaging(
        &self,
        materials: &[String],
        _context: &ProductIdentity,
    ) -> Result<PackagingAssessment> {
        if self.fail_describe_packaging {
            return Err(Error::Http("packaging description failed".to_string()));
        }
        let mut analysis = IndexMap::new();
        for material in materials {
            analysis.insert(
                material.clone(),
                PackagingDetails {
                    description: format!("{} details", material),
                    harmful: material.starts_with("plastic"),
                    health_concerns: "None identified".to_string(),
                    environmental_impact: "Recyclable".to_string(),
                    severity: SafetyLevel::Safe,
                },
            );
        }
        Ok(PackagingAssessment {
            analysis,
            overall_safety: SafetyLevel::Caution,
            summary: "Glass jar with a plastic lid".to_string(),
        })
    }
}

#[async_trait]
impl RecommendationService for FakeBackend {
    async fn get_recommendations(&self, _identity: &ProductIdentity) -> Result<Recommendations> {
        if self.fail_recommendations {
            return Err(Error::Http("no recommendations".to_string()));
        }
        Ok(Recommendations {
            vetted_products: vec![VettedProduct {
                id: "vp-1".to_string(),
                name: "Hazelnut butter".to_string(),
                price: Some("6.99".to_string()),
                image_url: None,
                permalink: None,
                description: Some("No palm oil".to_string()),
            }],
            ai_alternatives: vec![],
        })
    }
}

#[async_trait]
impl ImageUpload for FakeBackend {
    async fn upload(&self, local_path: &str) -> Result<String> {
        Ok(format!("https://cdn.example/{}", local_path))
    }
}

#[async_trait]
impl ScanHistoryBackend for FakeBackend {
    async fn save_scan_result(&self, record: &PersistedScanRecord) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_history_write {
            return Err(Error::Persistence("backend down".to_string()));
        }
        self.saved.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn get_scan_results(&self, _page: u32, _limit: u32) -> Result<Vec<PersistedScanRecord>> {
        Ok(self.saved.lock().unwrap().clone())
    }
}

#[async_trait]
impl AuthSession for FakeBackend {
    async fn is_authenticated(&self) -> bool {
        self.authenticated
    }
}

fn collaborators(backend: Arc<FakeBackend>) -> Arc<Collaborators> {
    Arc::new(Collaborators {
        identity: backend.clone(),
        ingredients: backend.clone(),
        packaging: backend.clone(),
        recommendations: backend.clone(),
        uploader: backend.clone(),
        history: backend.clone(),
        auth: backend,
    })
}

fn engine(backend: Arc<FakeBackend>) -> ScanEngine {
    ScanEngine::new(
        collaborators(backend),
        PipelineConfig::default(),
        ScanCache::new(5, 10),
    )
}

#[tokio::test]
async fn test_barcode_scan_settles_and_persists_once() {
    let backend = Arc::new(FakeBackend::happy());
    let engine = engine(backend.clone());

    let mut handle = match engine.scan(ScanKey::Barcode(NUTELLA_BARCODE.to_string())).await {
        ScanOutcome::Started(handle) => handle,
        ScanOutcome::Cached(_) => panic!("fresh engine should not have a cache hit"),
    };

    let snapshot = handle.finished().await;
    assert_eq!(snapshot.state, RunState::Persisted);
    assert!(snapshot.flags.all_clear());
    assert_eq!(snapshot.view_model.identity.name, "Nutella");
    assert_eq!(
        snapshot.view_model.ingredients.harmful["palm oil"],
        "palm oil is worth limiting"
    );
    assert_eq!(
        snapshot.view_model.packaging.overall_safety,
        SafetyLevel::Caution
    );
    assert_eq!(
        snapshot.recommendations.unwrap().vetted_products.len(),
        1
    );

    // exactly one record, and it mirrors the report
    assert_eq!(backend.save_calls.load(Ordering::SeqCst), 1);
    let saved = backend.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].product_name, "Nutella");
    assert_eq!(saved[0].scan_type, ScanKind::Barcode);
    assert_eq!(saved[0].harmful_ingredients.len(), 1);
    assert_eq!(saved[0].packaging.len(), 2);
}

#[tokio::test]
async fn test_settled_scan_is_served_from_cache() {
    let backend = Arc::new(FakeBackend::happy());
    let engine = engine(backend.clone());

    let key = ScanKey::Barcode(NUTELLA_BARCODE.to_string());
    match engine.scan(key.clone()).await {
        ScanOutcome::Started(mut handle) => {
            handle.finished().await;
        }
        ScanOutcome::Cached(_) => panic!("first scan must run the pipeline"),
    }

    match engine.scan(key).await {
        ScanOutcome::Cached(snapshot) => {
            assert_eq!(snapshot.state, RunState::Settled);
            assert!(snapshot.flags.all_clear());
            assert_eq!(snapshot.view_model.identity.name, "Nutella");
        }
        ScanOutcome::Started(_) => panic!("second scan must hit the cache"),
    }

    // the cached replay must not persist again
    assert_eq!(backend.save_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_barcode_fails_as_not_found() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: true,
        ..Default::default()
    });
    let engine = engine(backend.clone());

    let mut handle = engine.scan_fresh(ScanKey::Barcode("0000000000000".to_string()));
    let snapshot = handle.finished().await;

    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(snapshot.failure, Some(FailureKind::NotFound));
    assert!(snapshot.flags.all_clear());
    // a failed run writes nothing
    assert_eq!(backend.save_calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.cached_result_count().await, 0);
}

#[tokio::test]
async fn test_identify_network_failure() {
    let backend = Arc::new(FakeBackend {
        fail_identify_network: true,
        authenticated: true,
        ..Default::default()
    });
    let engine = engine(backend);

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.finished().await;

    assert_eq!(snapshot.state, RunState::Failed);
    assert_eq!(snapshot.failure, Some(FailureKind::NetworkUnavailable));
}

#[tokio::test]
async fn test_describe_failure_degrades_section_only() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: true,
        fail_describe_ingredients: true,
        ..Default::default()
    });
    let engine = engine(backend.clone());

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.finished().await;

    // the run still settles and persists
    assert_eq!(snapshot.state, RunState::Persisted);

    // ingredient names survive as placeholders, descriptions stay empty
    assert_eq!(snapshot.view_model.ingredients.harmful["palm oil"], "");
    assert_eq!(snapshot.view_model.ingredients.safe.len(), 2);

    // the sibling section is fully described
    assert_eq!(
        snapshot.view_model.packaging.analysis["glass_jar"].description,
        "glass_jar details"
    );

    // the degraded report is what gets persisted
    let saved = backend.saved.lock().unwrap();
    assert_eq!(saved[0].harmful_ingredients[0].description, "");
}

#[tokio::test]
async fn test_separate_failure_degrades_whole_branch() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: true,
        fail_separate_ingredients: true,
        ..Default::default()
    });
    let engine = engine(backend);

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.finished().await;

    assert_eq!(snapshot.state, RunState::Persisted);
    assert!(snapshot.view_model.ingredients.harmful.is_empty());
    assert!(snapshot.view_model.ingredients.safe.is_empty());
    // packaging is unaffected
    assert_eq!(snapshot.view_model.packaging.analysis.len(), 2);
}

#[tokio::test]
async fn test_recommendation_failure_is_silent() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: true,
        fail_recommendations: true,
        ..Default::default()
    });
    let engine = engine(backend);

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.finished().await;

    assert_eq!(snapshot.state, RunState::Persisted);
    assert!(snapshot.recommendations.is_none());
}

#[tokio::test]
async fn test_unauthenticated_run_caches_but_does_not_persist() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: false,
        ..Default::default()
    });
    let engine = engine(backend.clone());

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.finished().await;

    assert_eq!(snapshot.state, RunState::Settled);
    assert_eq!(backend.save_calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.cached_result_count().await, 1);
}

#[tokio::test]
async fn test_failed_persist_still_caches_and_retries_never() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: true,
        fail_history_write: true,
        ..Default::default()
    });
    let engine = engine(backend.clone());

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.finished().await;

    // the report itself is unaffected by the persistence failure
    assert_eq!(snapshot.state, RunState::Settled);
    assert!(snapshot.flags.all_clear());
    assert_eq!(engine.cached_result_count().await, 1);
    // one attempt, no retry
    assert_eq!(backend.save_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_photo_scan_and_defensive_cache_key_check() {
    let backend = Arc::new(FakeBackend::happy());
    let engine = engine(backend.clone());

    let mut handle = engine.scan_fresh(ScanKey::Photo("capture-001".to_string()));
    let snapshot = handle.finished().await;
    assert_eq!(snapshot.state, RunState::Persisted);
    assert_eq!(snapshot.view_model.identity.name, "Nutella");

    // same photo key hits the cache
    match engine.scan(ScanKey::Photo("capture-001".to_string())).await {
        ScanOutcome::Cached(cached) => assert!(cached.flags.all_clear()),
        ScanOutcome::Started(_) => panic!("same capture must hit the cache"),
    }

    // a different capture must not be served the stale photo entry
    match engine.scan(ScanKey::Photo("capture-002".to_string())).await {
        ScanOutcome::Started(mut handle) => {
            handle.finished().await;
        }
        ScanOutcome::Cached(_) => panic!("different capture must run the pipeline"),
    }
    assert_eq!(backend.save_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_cancellation_suppresses_late_results() {
    let backend = Arc::new(FakeBackend::happy());
    let engine = engine(backend.clone());

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    handle.cancel();
    let snapshot = handle.finished().await;

    // whatever had landed before the cancel is the final word; nothing
    // completes the run afterwards
    assert_ne!(snapshot.state, RunState::Persisted);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(handle.snapshot().state, snapshot.state);
}

#[tokio::test]
async fn test_settled_waits_for_flags_only() {
    let backend = Arc::new(FakeBackend::happy());
    let engine = engine(backend);

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    let snapshot = handle.settled().await;
    assert!(snapshot.flags.all_clear());
    assert!(matches!(
        snapshot.state,
        RunState::Settled | RunState::Persisted
    ));
}

#[tokio::test]
async fn test_history_pages_come_from_backend() {
    let backend = Arc::new(FakeBackend::happy());
    let engine = engine(backend);

    let mut handle = engine.scan_fresh(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    handle.finished().await;

    let records = engine.history(1, 20).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].product_name, "Nutella");
}

// ScanEngine is wired with its own cache internally; this covers the shared
// handle path the engine uses
#[tokio::test]
async fn test_runner_writes_shared_cache_on_settle() {
    let backend = Arc::new(FakeBackend {
        barcode_found: true,
        authenticated: false,
        ..Default::default()
    });
    let cache = Arc::new(RwLock::new(ScanCache::new(5, 10)));
    let bus = scanwise_common::events::EventBus::new(16);
    let runner = StageRunner::new(collaborators(backend), bus, PipelineConfig::default())
        .with_cache(cache.clone());

    let mut handle = runner.start(ScanKey::Barcode(NUTELLA_BARCODE.to_string()));
    handle.finished().await;

    let cache = cache.read().await;
    let entry = cache
        .get(&ScanKey::Barcode(NUTELLA_BARCODE.to_string()))
        .expect("settled run must be cached");
    assert_eq!(entry.view_model.identity.name, "Nutella");
}
