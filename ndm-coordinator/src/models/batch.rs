//! Batch and progress types
//!
//! A batch is ephemeral: it lives only in memory for the duration of one
//! `run_batch` call. The ledger is the only record that survives it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CatalogFilter;

/// Candidate selection request from the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionRequest {
    pub filter: CatalogFilter,
    /// Requested batch size; defaults to `batch_size`, capped at `max_batch_size`
    pub limit: Option<usize>,
}

/// Per-item failure captured during a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub reason: String,
}

/// How a batch loop ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every item was dispatched
    Completed,
    /// Stopped by the cancellation token; the remaining items were left untouched
    Cancelled,
    /// Stopped by a fatal remote error; the remaining items were left untouched
    Aborted { reason: String },
}

impl BatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "completed",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Aborted { .. } => "aborted",
        }
    }
}

/// Result of one `run_batch` call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never dispatched (cancelled or aborted before their turn)
    pub not_attempted: usize,
    pub errors: Vec<ItemFailure>,
    #[serde(flatten)]
    pub status: BatchStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// The batch currently holding the run guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveBatch {
    pub batch_id: Uuid,
    pub size: usize,
    pub started_at: DateTime<Utc>,
}

/// Most recent failure recorded in the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub item_id: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Aggregate view of the ledger for the dashboard
///
/// Derived on demand; never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub pending: u64,
    pub in_progress: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Size of the batch currently running, 0 when idle
    pub current_batch_size: usize,
    pub active_batch: Option<ActiveBatch>,
    pub last_error: Option<LastError>,
}

impl ProgressSnapshot {
    pub fn total(&self) -> u64 {
        self.pending + self.in_progress + self.succeeded + self.failed
    }
}
