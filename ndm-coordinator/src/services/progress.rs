//! Progress Publisher
//!
//! Snapshots are computed from committed ledger rows on every call. The only
//! in-memory input is the active batch's size, read from the orchestrator.

use crate::db::StatusLedger;
use crate::error::CoordinatorResult;
use crate::models::{MigrationState, ProgressSnapshot};

use super::orchestrator::BatchOrchestrator;

#[derive(Clone)]
pub struct ProgressPublisher {
    ledger: StatusLedger,
    orchestrator: BatchOrchestrator,
}

impl ProgressPublisher {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self {
            ledger: orchestrator.ledger().clone(),
            orchestrator,
        }
    }

    pub async fn snapshot(&self) -> CoordinatorResult<ProgressSnapshot> {
        let counts = self.ledger.count_by_state().await?;
        let count = |state: MigrationState| counts.get(&state).copied().unwrap_or(0);

        let active_batch = self.orchestrator.active_batch().await;

        Ok(ProgressSnapshot {
            pending: count(MigrationState::Pending),
            in_progress: count(MigrationState::InProgress),
            succeeded: count(MigrationState::Succeeded),
            failed: count(MigrationState::Failed),
            current_batch_size: active_batch.as_ref().map(|b| b.size).unwrap_or(0),
            active_batch,
            last_error: self.ledger.latest_failure().await?,
        })
    }
}
