//! Best-effort persistence of a settled scan
//!
//! Runs once per pipeline run, after every stage flag has cleared and only
//! for authenticated sessions. The caller sets its one-way "saved" latch
//! before invoking [`ResultPersister::save`], so racing flag updates can
//! never produce a duplicate record.
//!
//! Failure here is never user-visible: upload failure falls back to the
//! local image reference, and a failed history write is logged and
//! swallowed.

use crate::format::record_from_report;
use crate::services::{AuthSession, ImageUpload, ScanHistoryBackend};
use crate::types::{
    ImageRef, PersistedScanRecord, ProductViewModel, Recommendations, ScanKind, StageFlags,
};
use scanwise_common::Result;
use std::sync::Arc;
use tracing::warn;

/// Writes one normalized scan record per completed run
#[derive(Clone)]
pub struct ResultPersister {
    uploader: Arc<dyn ImageUpload>,
    history: Arc<dyn ScanHistoryBackend>,
    auth: Arc<dyn AuthSession>,
}

impl ResultPersister {
    pub fn new(
        uploader: Arc<dyn ImageUpload>,
        history: Arc<dyn ScanHistoryBackend>,
        auth: Arc<dyn AuthSession>,
    ) -> Self {
        Self {
            uploader,
            history,
            auth,
        }
    }

    /// Whether a save should start now
    ///
    /// All flags clear, the latch still open, and an authenticated session.
    /// The caller must flip its latch before starting the async save.
    pub async fn should_save(&self, flags: &StageFlags, latch_open: bool) -> bool {
        flags.all_clear() && latch_open && self.auth.is_authenticated().await
    }

    /// Upload the local image (if any) and persist the normalized record
    ///
    /// # Errors
    /// Returns `Error::Persistence` when the history write fails; the
    /// caller logs and swallows it. Upload failure alone is not an error.
    pub async fn save(
        &self,
        scan_type: ScanKind,
        view_model: &ProductViewModel,
        recommendations: Option<&Recommendations>,
    ) -> Result<PersistedScanRecord> {
        let mut record = record_from_report(scan_type, view_model, recommendations);

        if let Some(ImageRef::Local(path)) = &view_model.identity.image {
            match self.uploader.upload(path).await {
                Ok(url) => record.image_url = Some(url),
                Err(e) => {
                    warn!(
                        path = path.as_str(),
                        "Image upload failed, persisting local reference: {}", e
                    );
                }
            }
        }

        self.history.save_scan_result(&record).await?;
        Ok(record)
    }
}
