//! Scan progress event system
//!
//! Every pipeline run publishes its stage milestones on a broadcast bus so
//! UI layers (or the CLI) can render progress without polling. Events are
//! correlated by `run_id`; subscribers that lag beyond channel capacity
//! lose the oldest events, never the newest.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Which half of the report an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    Ingredients,
    Packaging,
}

/// Events emitted during a scan pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Pipeline run started for a scan key
    RunStarted { run_id: Uuid, scan_kind: String },

    /// Stage 1 resolved the product identity
    IdentityResolved { run_id: Uuid, product_name: String },

    /// Stage 1 failed; the run is over
    RunFailed { run_id: Uuid, error: String },

    /// A separate call resolved (names are now renderable)
    SectionSeparated {
        run_id: Uuid,
        section: ReportSection,
        item_count: usize,
    },

    /// A describe call resolved (placeholder descriptions filled in)
    SectionDescribed { run_id: Uuid, section: ReportSection },

    /// A separate/describe sub-call failed; only that section degrades
    SectionFailed {
        run_id: Uuid,
        section: ReportSection,
        error: String,
    },

    /// Safer-alternative suggestions arrived (best effort)
    RecommendationsReady { run_id: Uuid, vetted: usize, alternatives: usize },

    /// All loading flags cleared; the report is complete
    RunSettled { run_id: Uuid },

    /// The scan record was written to the history backend
    ResultPersisted { run_id: Uuid },
}

impl ScanEvent {
    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            ScanEvent::RunStarted { run_id, .. }
            | ScanEvent::IdentityResolved { run_id, .. }
            | ScanEvent::RunFailed { run_id, .. }
            | ScanEvent::SectionSeparated { run_id, .. }
            | ScanEvent::SectionDescribed { run_id, .. }
            | ScanEvent::SectionFailed { run_id, .. }
            | ScanEvent::RecommendationsReady { run_id, .. }
            | ScanEvent::RunSettled { run_id }
            | ScanEvent::ResultPersisted { run_id } => *run_id,
        }
    }
}

/// Broadcast bus for scan events
///
/// Cheap to clone; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` when no subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ScanEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<ScanEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    ///
    /// Progress events are not critical; a run with nobody watching is fine.
    pub fn emit_lossy(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_lossy_does_not_panic_without_subscribers() {
        let bus = EventBus::new(8);
        bus.emit_lossy(ScanEvent::RunSettled {
            run_id: Uuid::new_v4(),
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();

        bus.emit_lossy(ScanEvent::RunStarted {
            run_id,
            scan_kind: "barcode".to_string(),
        });
        bus.emit_lossy(ScanEvent::RunSettled { run_id });

        assert!(matches!(
            rx.recv().await.unwrap(),
            ScanEvent::RunStarted { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ScanEvent::RunSettled { .. }
        ));
    }

    #[test]
    fn test_run_id_accessor_covers_all_variants() {
        let run_id = Uuid::new_v4();
        let event = ScanEvent::SectionFailed {
            run_id,
            section: ReportSection::Packaging,
            error: "boom".to_string(),
        };
        assert_eq!(event.run_id(), run_id);
    }

    #[test]
    fn test_events_serialize_with_type_tag() {
        let event = ScanEvent::IdentityResolved {
            run_id: Uuid::new_v4(),
            product_name: "Nutella".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "identity_resolved");
        assert_eq!(json["product_name"], "Nutella");
    }
}
