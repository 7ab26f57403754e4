//! Progressive product analysis engine
//!
//! Turns a scan key (barcode or captured photo) into a progressively
//! filled product report: identity first, then ingredient and packaging
//! analysis in parallel, with safer-alternative recommendations fetched
//! independently. Settled results are cached per scan kind so returning to
//! a recent scan renders instantly, and completed runs are persisted once
//! to the scan-history backend for authenticated sessions.
//!
//! [`ScanEngine`] is the facade; the staged machinery lives in
//! [`pipeline`], the collaborator contracts and HTTP clients in
//! [`services`].

pub mod cache;
pub mod format;
pub mod pipeline;
pub mod services;
pub mod types;

use crate::cache::ScanCache;
use crate::pipeline::{Collaborators, PipelineConfig, RunHandle, ScanSnapshot, StageRunner};
use crate::services::{
    AnalysisClient, HistoryClient, HttpImageUploader, RecommendationClient, ScanHistoryBackend,
    TokenSession,
};
use crate::types::{PersistedScanRecord, ScanKey, ScanKind};
use scanwise_common::config::TomlConfig;
use scanwise_common::events::EventBus;
use scanwise_common::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Result of asking the engine to scan a key
pub enum ScanOutcome {
    /// A settled result was already cached; no pipeline run started
    Cached(ScanSnapshot),
    /// A fresh pipeline run is underway
    Started(RunHandle),
}

impl ScanOutcome {
    /// Current snapshot either way
    pub fn snapshot(&self) -> ScanSnapshot {
        match self {
            ScanOutcome::Cached(snapshot) => snapshot.clone(),
            ScanOutcome::Started(handle) => handle.snapshot(),
        }
    }
}

/// Facade over the cache, the pipeline runner, and the history backend
pub struct ScanEngine {
    runner: StageRunner,
    cache: Arc<RwLock<ScanCache>>,
    history: Arc<dyn ScanHistoryBackend>,
    bus: EventBus,
}

impl ScanEngine {
    /// Wire the engine from configuration with HTTP collaborators
    pub fn from_config(config: &TomlConfig) -> Result<Self> {
        let analysis = Arc::new(AnalysisClient::from_config(config)?);
        let history: Arc<HistoryClient> = Arc::new(HistoryClient::from_config(config)?);
        let collaborators = Arc::new(Collaborators {
            identity: analysis.clone(),
            ingredients: analysis.clone(),
            packaging: analysis,
            recommendations: Arc::new(RecommendationClient::from_config(config)?),
            uploader: Arc::new(HttpImageUploader::from_config(config)?),
            history: history.clone(),
            auth: Arc::new(TokenSession::from_config(config)),
        });
        Ok(Self::new(
            collaborators,
            PipelineConfig::from_toml(config),
            ScanCache::new(config.cache.photo_capacity, config.cache.barcode_capacity),
        ))
    }

    /// Wire the engine from explicit collaborators
    ///
    /// This is the seam tests use to substitute fakes.
    pub fn new(
        collaborators: Arc<Collaborators>,
        pipeline_config: PipelineConfig,
        cache: ScanCache,
    ) -> Self {
        let bus = EventBus::new(64);
        let cache = Arc::new(RwLock::new(cache));
        let history = collaborators.history.clone();
        let runner = StageRunner::new(collaborators, bus.clone(), pipeline_config)
            .with_cache(cache.clone());
        Self {
            runner,
            cache,
            history,
            bus,
        }
    }

    /// Engine-wide event bus
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Scan a key, consulting the result cache first
    ///
    /// A cache hit returns the stored report with nothing loading and does
    /// not touch the network. A miss starts a pipeline run.
    pub async fn scan(&self, key: ScanKey) -> ScanOutcome {
        if let Some(entry) = self.cache.read().await.get(&key) {
            // the photo collection returns its most recent entry for any
            // photo key, so re-check the key actually matches
            if entry.key == key {
                info!(kind = %key.kind(), "Serving scan from cache");
                return ScanOutcome::Cached(ScanSnapshot::from_cache_entry(entry));
            }
            debug!(kind = %key.kind(), "Cache entry key mismatch, running pipeline");
        }
        ScanOutcome::Started(self.runner.start(key))
    }

    /// Scan a key, bypassing the cache
    pub fn scan_fresh(&self, key: ScanKey) -> RunHandle {
        self.runner.start(key)
    }

    /// Page through previously persisted scans, most recent first
    pub async fn history(&self, page: u32, limit: u32) -> Result<Vec<PersistedScanRecord>> {
        self.history.get_scan_results(page, limit).await
    }

    /// Drop cached results for one scan kind, or all of them
    pub async fn clear_cache(&self, kind: Option<ScanKind>) {
        self.cache.write().await.clear(kind);
    }

    /// Number of currently cached results across both collections
    pub async fn cached_result_count(&self) -> usize {
        let cache = self.cache.read().await;
        cache.len(ScanKind::Photo) + cache.len(ScanKind::Barcode)
    }
}
