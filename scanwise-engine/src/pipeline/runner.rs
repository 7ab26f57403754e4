//! Staged scan pipeline runner
//!
//! One runner serves both barcode and photo scans; the flows differ only in
//! which Stage 1 lookup is used. Control flow per run:
//!
//! 1. Identify (blocking for the rest; NotFound ends the run)
//! 2. Ingredients branch: separate, then describe
//! 3. Packaging branch: separate, then describe (concurrent with 2)
//! 4. Recommendation fetch, independent of 2 and 3
//!
//! Every stage callback sends a [`StageUpdate`] into the run's reducer
//! task, which owns the state, publishes snapshots through a watch channel,
//! and triggers persistence and the cache write once the run settles.
//! Cancellation stops the reducer; in-flight requests are not aborted at
//! the network layer, their late results are simply dropped.

use crate::cache::ScanCache;
use crate::pipeline::persister::ResultPersister;
use crate::pipeline::recommendations::RecommendationFetcher;
use crate::pipeline::state::{ScanReducer, ScanSnapshot, StageUpdate};
use crate::services::{
    AuthSession, IdentityLookup, ImageUpload, IngredientAnalysis, PackagingAnalysis,
    RecommendationService, ScanHistoryBackend,
};
use crate::types::{
    BarcodeLookup, FailureKind, IdentifiedProduct, RunState, ScanKey,
};
use scanwise_common::config::TomlConfig;
use scanwise_common::events::{EventBus, ScanEvent};
use scanwise_common::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Timeout budgets for the pipeline
///
/// Only identify and recommendations carry a hard budget; the enrichment
/// sub-calls run without one.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub identify_timeout: Duration,
    pub recommendation_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            identify_timeout: Duration::from_secs(45),
            recommendation_timeout: Duration::from_secs(45),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(config: &TomlConfig) -> Self {
        Self {
            identify_timeout: Duration::from_secs(config.timeouts.identify_secs),
            recommendation_timeout: Duration::from_secs(config.timeouts.recommendation_secs),
        }
    }
}

/// The external collaborators one run needs
pub struct Collaborators {
    pub identity: Arc<dyn IdentityLookup>,
    pub ingredients: Arc<dyn IngredientAnalysis>,
    pub packaging: Arc<dyn PackagingAnalysis>,
    pub recommendations: Arc<dyn RecommendationService>,
    pub uploader: Arc<dyn ImageUpload>,
    pub history: Arc<dyn ScanHistoryBackend>,
    pub auth: Arc<dyn AuthSession>,
}

/// Handle to one running (or finished) pipeline run
pub struct RunHandle {
    run_id: Uuid,
    snapshot_rx: watch::Receiver<ScanSnapshot>,
    cancel: CancellationToken,
    bus: EventBus,
}

impl RunHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> ScanSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// A fresh receiver for snapshot updates
    pub fn watch(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Subscribe to this run's progress events
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<ScanEvent> {
        self.bus.subscribe()
    }

    /// Suppress all further state publication for this run
    ///
    /// In-flight requests keep running; their results are dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until every stage flag has cleared or the run failed
    pub async fn settled(&mut self) -> ScanSnapshot {
        loop {
            let snapshot = self.snapshot_rx.borrow_and_update().clone();
            if snapshot.flags.all_clear() || snapshot.state == RunState::Failed {
                return snapshot;
            }
            if self.snapshot_rx.changed().await.is_err() {
                return self.snapshot_rx.borrow().clone();
            }
        }
    }

    /// Wait until the run publishes nothing further (including the
    /// persistence outcome), returning the final snapshot
    pub async fn finished(&mut self) -> ScanSnapshot {
        while self.snapshot_rx.changed().await.is_ok() {}
        self.snapshot_rx.borrow().clone()
    }
}

/// Runs the staged enrichment for scan keys
pub struct StageRunner {
    collaborators: Arc<Collaborators>,
    bus: EventBus,
    cache: Option<Arc<RwLock<ScanCache>>>,
    config: PipelineConfig,
}

impl StageRunner {
    pub fn new(collaborators: Arc<Collaborators>, bus: EventBus, config: PipelineConfig) -> Self {
        Self {
            collaborators,
            bus,
            cache: None,
            config,
        }
    }

    /// Settled runs will be written into `cache` for instant back-navigation
    pub fn with_cache(mut self, cache: Arc<RwLock<ScanCache>>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Start a pipeline run for one scan key
    ///
    /// Returns immediately; progress is observed through the handle's
    /// snapshot watch and the event bus.
    pub fn start(&self, key: ScanKey) -> RunHandle {
        let run_id = Uuid::new_v4();
        let reducer = ScanReducer::new(run_id, key.clone());
        let (snapshot_tx, snapshot_rx) = watch::channel(reducer.snapshot().clone());
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        info!(run_id = %run_id, kind = %key.kind(), "Starting scan pipeline run");
        self.bus.emit_lossy(ScanEvent::RunStarted {
            run_id,
            scan_kind: key.kind().to_string(),
        });

        let persister = ResultPersister::new(
            self.collaborators.uploader.clone(),
            self.collaborators.history.clone(),
            self.collaborators.auth.clone(),
        );

        tokio::spawn(reducer_loop(
            reducer,
            update_rx,
            update_tx.clone(),
            snapshot_tx,
            self.bus.clone(),
            self.cache.clone(),
            persister,
            cancel.clone(),
        ));

        tokio::spawn(run_stage_one(
            self.collaborators.clone(),
            key,
            self.config,
            update_tx,
        ));

        RunHandle {
            run_id,
            snapshot_rx,
            cancel,
            bus: self.bus.clone(),
        }
    }
}

/// State-owning task for one run
///
/// Serialises every update, publishes snapshots, writes the cache on
/// settle, and drives the persistence latch.
#[allow(clippy::too_many_arguments)]
async fn reducer_loop(
    mut reducer: ScanReducer,
    mut update_rx: mpsc::UnboundedReceiver<StageUpdate>,
    persist_tx: mpsc::UnboundedSender<StageUpdate>,
    snapshot_tx: watch::Sender<ScanSnapshot>,
    bus: EventBus,
    cache: Option<Arc<RwLock<ScanCache>>>,
    persister: ResultPersister,
    cancel: CancellationToken,
) {
    let mut latch_open = true;
    let mut cached = false;

    loop {
        let update = tokio::select! {
            // cancellation wins over queued updates
            biased;
            _ = cancel.cancelled() => {
                debug!(run_id = %reducer.snapshot().run_id, "Run cancelled, suppressing further updates");
                break;
            }
            maybe = update_rx.recv() => match maybe {
                Some(update) => update,
                None => break,
            },
        };

        let persist_attempted = matches!(update, StageUpdate::PersistOutcome { .. });
        let events = reducer.apply(update);
        let _ = snapshot_tx.send(reducer.snapshot().clone());
        for event in events {
            bus.emit_lossy(event);
        }

        let snapshot = reducer.snapshot();
        if persist_attempted || snapshot.state.is_terminal() {
            break;
        }

        if snapshot.state == RunState::Settled {
            if !cached {
                cached = true;
                if let Some(cache) = &cache {
                    cache.write().await.put(snapshot.to_cache_entry());
                }
            }

            if persister.should_save(&snapshot.flags, latch_open).await {
                // latch closes before the save starts, so racing flag
                // updates cannot schedule a second record
                latch_open = false;
                let persister = persister.clone();
                let scan_type = snapshot.key.kind();
                let view_model = snapshot.view_model.clone();
                let recommendations = snapshot.recommendations.clone();
                let tx = persist_tx.clone();
                tokio::spawn(async move {
                    let success = match persister
                        .save(scan_type, &view_model, recommendations.as_ref())
                        .await
                    {
                        Ok(_) => true,
                        Err(e) => {
                            warn!("Scan persistence failed: {}", e);
                            false
                        }
                    };
                    let _ = tx.send(StageUpdate::PersistOutcome { success });
                });
            } else if latch_open {
                // settled with nothing to persist (unauthenticated)
                break;
            }
            // latch closed: keep looping for the persistence outcome
        }
    }
}

/// Stage 1, then fan out the enrichment branches on success
async fn run_stage_one(
    collaborators: Arc<Collaborators>,
    key: ScanKey,
    config: PipelineConfig,
    tx: mpsc::UnboundedSender<StageUpdate>,
) {
    let lookup = async {
        match &key {
            ScanKey::Barcode(code) => {
                match collaborators.identity.lookup_by_barcode(code).await? {
                    BarcodeLookup {
                        found: true,
                        product: Some(product),
                    } => Ok(product),
                    _ => Err(Error::NotFound(format!("No product for barcode {}", code))),
                }
            }
            ScanKey::Photo(image) => collaborators.identity.identify_by_image(image).await,
        }
    };

    let product = match tokio::time::timeout(config.identify_timeout, lookup).await {
        Ok(Ok(product)) => product,
        Ok(Err(e)) => {
            warn!(key = key.value(), "Identification failed: {}", e);
            let _ = tx.send(StageUpdate::IdentityFailed {
                kind: FailureKind::from(&e),
                message: e.to_string(),
            });
            return;
        }
        Err(_) => {
            warn!(key = key.value(), "Identification timed out");
            let _ = tx.send(StageUpdate::IdentityFailed {
                kind: FailureKind::NetworkUnavailable,
                message: "Product identification timed out".to_string(),
            });
            return;
        }
    };

    if tx
        .send(StageUpdate::IdentityResolved {
            product: product.clone(),
        })
        .is_err()
    {
        return; // run already torn down
    }

    // the two enrichment branches and the recommendation fetch run
    // concurrently and do not block each other; completion is observed
    // through the flags only
    {
        let collaborators = collaborators.clone();
        let product = product.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            run_ingredients_branch(collaborators, product, tx).await;
        });
    }
    {
        let collaborators = collaborators.clone();
        let product = product.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            run_packaging_branch(collaborators, product, tx).await;
        });
    }
    {
        let fetcher = RecommendationFetcher::new(
            collaborators.recommendations.clone(),
            config.recommendation_timeout,
        );
        tokio::spawn(async move {
            let recommendations = fetcher.fetch(&product.identity, None).await;
            let _ = tx.send(StageUpdate::RecommendationsResolved { recommendations });
        });
    }
}

/// Ingredients branch: separate, then describe
async fn run_ingredients_branch(
    collaborators: Arc<Collaborators>,
    product: IdentifiedProduct,
    tx: mpsc::UnboundedSender<StageUpdate>,
) {
    let separated = match collaborators.ingredients.separate_ingredients(&product).await {
        Ok(separated) => separated,
        Err(e) => {
            warn!(product = %product.identity.name, "Ingredient separation failed: {}", e);
            let _ = tx.send(StageUpdate::IngredientBranchFailed {
                during_describe: false,
                message: e.to_string(),
            });
            return;
        }
    };

    if tx
        .send(StageUpdate::IngredientsSeparated {
            harmful: separated.harmful.clone(),
            safe: separated.safe.clone(),
        })
        .is_err()
    {
        return;
    }

    // describe fires immediately after separation; names render while the
    // explanations are still in flight
    match collaborators
        .ingredients
        .describe_ingredients(&separated.harmful, &separated.safe)
        .await
    {
        Ok(descriptions) => {
            let _ = tx.send(StageUpdate::IngredientDescriptionsReady { descriptions });
        }
        Err(e) => {
            warn!(product = %product.identity.name, "Ingredient description failed: {}", e);
            let _ = tx.send(StageUpdate::IngredientBranchFailed {
                during_describe: true,
                message: e.to_string(),
            });
        }
    }
}

/// Packaging branch: separate, then describe
async fn run_packaging_branch(
    collaborators: Arc<Collaborators>,
    product: IdentifiedProduct,
    tx: mpsc::UnboundedSender<StageUpdate>,
) {
    let separated = match collaborators.packaging.separate_packaging(&product).await {
        Ok(separated) => separated,
        Err(e) => {
            warn!(product = %product.identity.name, "Packaging separation failed: {}", e);
            let _ = tx.send(StageUpdate::PackagingBranchFailed {
                during_describe: false,
                message: e.to_string(),
            });
            return;
        }
    };

    if tx
        .send(StageUpdate::PackagingSeparated {
            materials: separated.materials.clone(),
        })
        .is_err()
    {
        return;
    }

    match collaborators
        .packaging
        .describe_packaging(&separated.materials, &product.identity)
        .await
    {
        Ok(assessment) => {
            let _ = tx.send(StageUpdate::PackagingDescriptionsReady { assessment });
        }
        Err(e) => {
            warn!(product = %product.identity.name, "Packaging description failed: {}", e);
            let _ = tx.send(StageUpdate::PackagingBranchFailed {
                during_describe: true,
                message: e.to_string(),
            });
        }
    }
}
