//! Event types for the fincode event system
//!
//! Provides shared event definitions and the EventBus used by the
//! codification engine to notify collaborators (document pipeline, UI)
//! of state changes. Side effects that other services care about are
//! published here explicitly instead of being deferred to a scheduler.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Fincode event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission to interested collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CodifyEvent {
    /// A new extraction aggregate was created by Fast Pass
    ExtractionCreated {
        extraction_id: Uuid,
        document_id: Uuid,
        item_count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An extraction's items or stats changed (any resolver pass or confirmation)
    ExtractionUpdated {
        extraction_id: Uuid,
        confirmed: usize,
        suggested: usize,
        pending_review: usize,
        is_fully_confirmed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Smart Pass finished for an extraction
    SmartPassCompleted {
        extraction_id: Uuid,
        suggestions_applied: usize,
        new_code_suggestions: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A canonical item code was created (curator or confirmation path)
    ItemCodeCreated {
        code_id: Uuid,
        code: String,
        category: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new alias was learned; future Fast Pass runs resolve it directly
    AliasCreated {
        alias_id: Uuid,
        canonical_code: String,
        source: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for engine-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CodifyEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<CodifyEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening; emitting into an
    /// empty bus is not an engine failure, so callers typically `.ok()`.
    pub fn emit(
        &self,
        event: CodifyEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<CodifyEvent>> {
        self.tx.send(event)
    }

    /// Returns the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(CodifyEvent::AliasCreated {
            alias_id: Uuid::new_v4(),
            canonical_code: "costs.siteAcquisition".to_string(),
            source: "user_confirmed".to_string(),
            timestamp: chrono::Utc::now(),
        })
        .expect("at least one subscriber");

        let event = rx.recv().await.expect("event delivered");
        match event {
            CodifyEvent::AliasCreated { canonical_code, .. } => {
                assert_eq!(canonical_code, "costs.siteAcquisition");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_err() {
        let bus = EventBus::new(4);
        let result = bus.emit(CodifyEvent::SmartPassCompleted {
            extraction_id: Uuid::new_v4(),
            suggestions_applied: 0,
            new_code_suggestions: 0,
            timestamp: chrono::Utc::now(),
        });
        assert!(result.is_err());
    }
}
