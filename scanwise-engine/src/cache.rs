//! In-memory scan result cache
//!
//! Process-lifetime store of recent scan results so navigating back to a
//! report is instant and does not re-trigger paid analysis calls.
//!
//! Photo and barcode results live in separate bounded collections. Eviction
//! is by insert recency only: `put` prepends and truncates, and a read does
//! not promote an entry.
//!
//! Barcode lookups are exact-key. Photo lookups return the single most
//! recently inserted entry regardless of the requested key; the caller must
//! verify the image handle matches before trusting it. That asymmetry is
//! intentional and callers carry the defensive equality check.

use crate::types::{CacheEntry, ScanKey, ScanKind};
use std::collections::VecDeque;
use tracing::debug;

/// Bounded two-kind scan result cache
///
/// Single-writer: the currently-active result screen writes its own kind.
/// A miss is not an error, it just triggers a fresh pipeline run.
#[derive(Debug)]
pub struct ScanCache {
    photo: VecDeque<CacheEntry>,
    barcode: VecDeque<CacheEntry>,
    photo_capacity: usize,
    barcode_capacity: usize,
}

impl ScanCache {
    pub fn new(photo_capacity: usize, barcode_capacity: usize) -> Self {
        Self {
            photo: VecDeque::with_capacity(photo_capacity),
            barcode: VecDeque::with_capacity(barcode_capacity),
            photo_capacity,
            barcode_capacity,
        }
    }

    /// Insert an entry, evicting the oldest beyond the kind's capacity
    pub fn put(&mut self, entry: CacheEntry) {
        let kind = entry.key.kind();
        let (store, capacity) = match kind {
            ScanKind::Photo => (&mut self.photo, self.photo_capacity),
            ScanKind::Barcode => (&mut self.barcode, self.barcode_capacity),
        };
        store.push_front(entry);
        store.truncate(capacity);
        debug!(kind = %kind, len = store.len(), "Cache entry stored");
    }

    /// Look up an entry for a scan key
    ///
    /// Barcode: exact key match. Photo: the most recent entry whatever its
    /// key; callers verify identity before restoring from it.
    pub fn get(&self, key: &ScanKey) -> Option<&CacheEntry> {
        match key.kind() {
            ScanKind::Barcode => self.barcode.iter().find(|e| &e.key == key),
            ScanKind::Photo => self.photo.front(),
        }
    }

    /// Drop entries of one kind, or everything
    pub fn clear(&mut self, kind: Option<ScanKind>) {
        match kind {
            Some(ScanKind::Photo) => self.photo.clear(),
            Some(ScanKind::Barcode) => self.barcode.clear(),
            None => {
                self.photo.clear();
                self.barcode.clear();
            }
        }
    }

    /// Number of entries of one kind
    pub fn len(&self, kind: ScanKind) -> usize {
        match kind {
            ScanKind::Photo => self.photo.len(),
            ScanKind::Barcode => self.barcode.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.photo.is_empty() && self.barcode.is_empty()
    }
}
