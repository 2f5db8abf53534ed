//! Migration event types and the in-process event bus
//!
//! Events are a notification side channel for the dashboard. They are never
//! a source of truth: the status ledger is. Emission is lossy so a batch
//! never waits on, or fails because of, a missing subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the migration coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MigrationEvent {
    /// A batch acquired the run guard and is about to dispatch
    BatchStarted {
        batch_id: Uuid,
        size: usize,
        timestamp: DateTime<Utc>,
    },

    /// An item was marked in progress and is being sent to its manager
    ItemStarted {
        batch_id: Uuid,
        item_id: String,
        title: String,
        /// 1-based position within the batch
        position: usize,
        timestamp: DateTime<Utc>,
    },

    /// An item reached a terminal state
    ItemCompleted {
        batch_id: Uuid,
        item_id: String,
        succeeded: bool,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The batch loop returned (completed, cancelled or aborted)
    BatchFinished {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        /// "completed", "cancelled" or "aborted"
        status: String,
        timestamp: DateTime<Utc>,
    },

    /// Orphaned in-progress records were demoted at startup
    LedgerReconciled {
        count: u64,
        timestamp: DateTime<Utc>,
    },
}

impl MigrationEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            MigrationEvent::BatchStarted { .. } => "BatchStarted",
            MigrationEvent::ItemStarted { .. } => "ItemStarted",
            MigrationEvent::ItemCompleted { .. } => "ItemCompleted",
            MigrationEvent::BatchFinished { .. } => "BatchFinished",
            MigrationEvent::LedgerReconciled { .. } => "LedgerReconciled",
        }
    }
}

/// Broadcast bus for [`MigrationEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MigrationEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity`
    /// events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MigrationEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MigrationEvent,
    ) -> Result<usize, broadcast::error::SendError<MigrationEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MigrationEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
