//! Batch Orchestrator
//!
//! Resolves selections against the catalog and the ledger, then drains a batch
//! one item at a time: `in_progress` marker, paced remote call, terminal state.
//!
//! # Concurrency
//! One batch per process. The run guard is taken before anything is written,
//! so a second request fails with `BatchInProgress` and leaves the ledger as
//! it was. Requeue and found-status checks take the same guard.
//!
//! # Failure handling
//! - Per-item remote failures are recorded and the batch continues
//! - Transient failures are retried, each attempt through the pacing gate
//! - An unauthorized manager aborts the rest of the batch
//! - Catalog or ledger failures fail the whole call

use chrono::{DateTime, Utc};
use ndm_common::{EventBus, MigrationEvent};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::pacing::PacingGate;
use crate::catalog::CatalogReader;
use crate::db::StatusLedger;
use crate::error::{CoordinatorError, CoordinatorResult};
use crate::models::{
    ActiveBatch, BatchOutcome, BatchStatus, CatalogFilter, CatalogItem, ItemFailure, Manager,
    MigrationState, SelectionRequest,
};
use crate::remote::{RemoteClient, RemoteError};

/// Attempts per item when the manager keeps failing transiently
pub const MAX_ATTEMPTS: u32 = 3;

/// Batch sizing and pacing
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch_size: usize,
    pub max_batch_size: usize,
    pub api_delay: Duration,
}

impl From<&ndm_common::AppConfig> for OrchestratorSettings {
    fn from(config: &ndm_common::AppConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            max_batch_size: config.max_batch_size,
            api_delay: config.api_delay,
        }
    }
}

/// Handle to a batch running in the background
#[derive(Debug)]
pub struct BatchHandle {
    pub batch_id: Uuid,
    pub size: usize,
    cancel: CancellationToken,
    join: JoinHandle<CoordinatorResult<BatchOutcome>>,
}

impl BatchHandle {
    /// Stop after the current item
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the batch to finish
    pub async fn join(self) -> CoordinatorResult<BatchOutcome> {
        self.join
            .await
            .map_err(|e| CoordinatorError::Internal(format!("batch task failed: {}", e)))?
    }
}

/// Result of a user re-queue
#[derive(Debug, Clone, Serialize)]
pub struct RequeueOutcome {
    pub reset: usize,
    /// Ids with no ledger record
    pub unknown: Vec<String>,
}

/// Found-status result for one item
#[derive(Debug, Clone, Serialize)]
pub struct FoundCheck {
    pub item_id: String,
    pub found: Option<bool>,
    pub error: Option<String>,
}

/// Connection test result for one manager
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionCheck {
    pub manager: Manager,
    pub ok: bool,
    pub version: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug)]
struct ActiveRun {
    info: ActiveBatch,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    catalog: Arc<dyn CatalogReader>,
    ledger: StatusLedger,
    remote: Arc<dyn RemoteClient>,
    gate: PacingGate,
    events: EventBus,
    settings: OrchestratorSettings,
    run_guard: Arc<Mutex<()>>,
    active: Arc<RwLock<Option<ActiveRun>>>,
    last_outcome: Arc<RwLock<Option<BatchOutcome>>>,
    reconciled_at_startup: u64,
}

impl BatchOrchestrator {
    /// Build the orchestrator after demoting orphaned `in_progress` records
    ///
    /// Reconciliation runs here so that no batch can be accepted before it.
    pub async fn start(
        catalog: Arc<dyn CatalogReader>,
        ledger: StatusLedger,
        remote: Arc<dyn RemoteClient>,
        events: EventBus,
        settings: OrchestratorSettings,
    ) -> CoordinatorResult<Self> {
        let reconciled = ledger.reconcile_orphans().await?;
        if reconciled > 0 {
            tracing::warn!(count = reconciled, "Demoted interrupted items to failed");
        }
        events.emit_lossy(MigrationEvent::LedgerReconciled {
            count: reconciled,
            timestamp: Utc::now(),
        });

        Ok(Self {
            catalog,
            ledger,
            remote,
            gate: PacingGate::new(settings.api_delay),
            events,
            settings,
            run_guard: Arc::new(Mutex::new(())),
            active: Arc::new(RwLock::new(None)),
            last_outcome: Arc::new(RwLock::new(None)),
            reconciled_at_startup: reconciled,
        })
    }

    pub fn ledger(&self) -> &StatusLedger {
        &self.ledger
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogReader> {
        &self.catalog
    }

    pub fn reconciled_at_startup(&self) -> u64 {
        self.reconciled_at_startup
    }

    pub async fn active_batch(&self) -> Option<ActiveBatch> {
        self.active.read().await.as_ref().map(|run| run.info.clone())
    }

    pub async fn last_outcome(&self) -> Option<BatchOutcome> {
        self.last_outcome.read().await.clone()
    }

    fn try_guard(&self) -> CoordinatorResult<OwnedMutexGuard<()>> {
        self.run_guard
            .clone()
            .try_lock_owned()
            .map_err(|_| CoordinatorError::BatchInProgress)
    }

    /// Items that still need a re-download, in catalog order
    ///
    /// Excludes `succeeded` items (a re-queue makes them `pending` again) and
    /// items another run holds `in_progress`. The result never exceeds
    /// `max_batch_size`; a request without a limit gets `batch_size`.
    pub async fn select_candidates(&self, request: &SelectionRequest) -> CoordinatorResult<Vec<CatalogItem>> {
        let limit = request
            .limit
            .unwrap_or(self.settings.batch_size)
            .min(self.settings.max_batch_size);

        let items = self.catalog.list_items(&request.filter).await?;

        let mut excluded: HashSet<String> = HashSet::new();
        for state in [MigrationState::Succeeded, MigrationState::InProgress] {
            excluded.extend(
                self.ledger
                    .list_by_state(state)
                    .await?
                    .into_iter()
                    .map(|record| record.item_id),
            );
        }

        let candidates: Vec<CatalogItem> = items
            .into_iter()
            .filter(|item| !excluded.contains(&item.id))
            .take(limit)
            .collect();

        tracing::debug!(
            limit,
            excluded = excluded.len(),
            selected = candidates.len(),
            "Selected candidates"
        );

        Ok(candidates)
    }

    /// Process `items` in order and wait for the outcome
    pub async fn run_batch(
        &self,
        items: Vec<CatalogItem>,
        cancel: CancellationToken,
    ) -> CoordinatorResult<BatchOutcome> {
        let guard = self.try_guard()?;
        let batch_id = Uuid::new_v4();
        let started_at = self.begin(batch_id, items.len(), &cancel).await;
        self.execute(batch_id, items, cancel, started_at, guard).await
    }

    /// Start processing `items` on a background task
    ///
    /// The batch is visible to `active_batch` and `cancel_active` as soon as
    /// this returns, before the task has been polled.
    pub async fn start_batch(&self, items: Vec<CatalogItem>) -> CoordinatorResult<BatchHandle> {
        let guard = self.try_guard()?;
        let batch_id = Uuid::new_v4();
        let size = items.len();
        let cancel = CancellationToken::new();
        let started_at = self.begin(batch_id, size, &cancel).await;

        let orchestrator = self.clone();
        let token = cancel.clone();
        let join = tokio::spawn(async move {
            orchestrator
                .execute(batch_id, items, token, started_at, guard)
                .await
        });

        Ok(BatchHandle {
            batch_id,
            size,
            cancel,
            join,
        })
    }

    /// Cancel the running batch, if any; returns its id
    pub async fn cancel_active(&self) -> Option<Uuid> {
        let active = self.active.read().await;
        active.as_ref().map(|run| {
            run.cancel.cancel();
            run.info.batch_id
        })
    }

    /// Wait until no batch, re-queue or found-status check holds the run guard
    pub async fn wait_idle(&self) {
        let _guard = self.run_guard.lock().await;
    }

    /// Publish the run; the caller must already hold the run guard
    async fn begin(&self, batch_id: Uuid, size: usize, cancel: &CancellationToken) -> DateTime<Utc> {
        let started_at = Utc::now();
        *self.active.write().await = Some(ActiveRun {
            info: ActiveBatch {
                batch_id,
                size,
                started_at,
            },
            cancel: cancel.clone(),
        });
        started_at
    }

    async fn execute(
        &self,
        batch_id: Uuid,
        items: Vec<CatalogItem>,
        cancel: CancellationToken,
        started_at: DateTime<Utc>,
        _guard: OwnedMutexGuard<()>,
    ) -> CoordinatorResult<BatchOutcome> {
        let result = self.process(batch_id, &items, &cancel, started_at).await;

        *self.active.write().await = None;

        match &result {
            Ok(outcome) => {
                tracing::info!(
                    batch_id = %batch_id,
                    status = outcome.status.label(),
                    succeeded = outcome.succeeded,
                    failed = outcome.failed,
                    not_attempted = outcome.not_attempted,
                    "Batch finished"
                );
                self.events.emit_lossy(MigrationEvent::BatchFinished {
                    batch_id,
                    succeeded: outcome.succeeded,
                    failed: outcome.failed,
                    status: outcome.status.label().to_string(),
                    timestamp: outcome.finished_at,
                });
                *self.last_outcome.write().await = Some(outcome.clone());
            }
            Err(e) => {
                tracing::error!(batch_id = %batch_id, error = %e, "Batch failed");
                self.events.emit_lossy(MigrationEvent::BatchFinished {
                    batch_id,
                    succeeded: 0,
                    failed: 0,
                    status: "error".to_string(),
                    timestamp: Utc::now(),
                });
            }
        }

        result
    }

    async fn process(
        &self,
        batch_id: Uuid,
        items: &[CatalogItem],
        cancel: &CancellationToken,
        started_at: DateTime<Utc>,
    ) -> CoordinatorResult<BatchOutcome> {
        self.ledger.enqueue(items).await?;

        tracing::info!(batch_id = %batch_id, size = items.len(), "Batch started");
        self.events.emit_lossy(MigrationEvent::BatchStarted {
            batch_id,
            size: items.len(),
            timestamp: started_at,
        });

        let mut succeeded = 0;
        let mut failed = 0;
        let mut attempted = 0;
        let mut errors = Vec::new();
        let mut status = BatchStatus::Completed;

        for (position, item) in items.iter().enumerate() {
            if cancel.is_cancelled() || !self.gate.ready(cancel).await {
                tracing::info!(batch_id = %batch_id, position, "Batch cancelled");
                status = BatchStatus::Cancelled;
                break;
            }

            match self.ledger.upsert(item, MigrationState::InProgress, None).await {
                Ok(()) => {}
                Err(CoordinatorError::InvalidTransition { from, .. }) => {
                    tracing::warn!(item_id = %item.id, state = %from, "Skipping item no longer eligible");
                    continue;
                }
                Err(e) => return Err(e),
            }
            attempted += 1;

            self.events.emit_lossy(MigrationEvent::ItemStarted {
                batch_id,
                item_id: item.id.clone(),
                title: item.display_title(),
                position: position + 1,
                timestamp: Utc::now(),
            });

            match self.dispatch(item).await {
                Ok(()) => {
                    self.ledger.upsert(item, MigrationState::Succeeded, None).await?;
                    succeeded += 1;
                    self.emit_completed(batch_id, item, None);
                }
                Err(err) => {
                    let reason = err.to_string();
                    self.ledger
                        .upsert(item, MigrationState::Failed, Some(&reason))
                        .await?;
                    failed += 1;
                    self.emit_completed(batch_id, item, Some(reason.clone()));

                    errors.push(ItemFailure {
                        item_id: item.id.clone(),
                        reason: reason.clone(),
                    });

                    if err.is_unauthorized() {
                        tracing::error!(
                            batch_id = %batch_id,
                            item_id = %item.id,
                            error = %reason,
                            "Aborting batch: manager rejected the API key"
                        );
                        status = BatchStatus::Aborted { reason };
                        break;
                    }

                    tracing::warn!(item_id = %item.id, error = %reason, "Item failed");
                }
            }
        }

        Ok(BatchOutcome {
            batch_id,
            succeeded,
            failed,
            not_attempted: items.len() - attempted,
            errors,
            status,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// One remote re-download with bounded retry of transient failures
    async fn dispatch(&self, item: &CatalogItem) -> Result<(), RemoteError> {
        let mut attempt = 1;
        loop {
            self.gate.acquire().await;
            match self.remote.trigger_redownload(item).await {
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    tracing::warn!(
                        item_id = %item.id,
                        manager = %item.manager(),
                        attempt,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    fn emit_completed(&self, batch_id: Uuid, item: &CatalogItem, error: Option<String>) {
        self.events.emit_lossy(MigrationEvent::ItemCompleted {
            batch_id,
            item_id: item.id.clone(),
            succeeded: error.is_none(),
            error,
            timestamp: Utc::now(),
        });
    }

    /// User re-queue: reset each id to `pending`
    pub async fn requeue(&self, ids: &[String]) -> CoordinatorResult<RequeueOutcome> {
        let _guard = self.try_guard()?;

        let mut reset = 0;
        let mut unknown = Vec::new();
        for id in ids {
            if self.ledger.reset(id).await? {
                reset += 1;
            } else {
                unknown.push(id.clone());
            }
        }

        tracing::info!(reset, unknown = unknown.len(), "Re-queued items");
        Ok(RequeueOutcome { reset, unknown })
    }

    /// Ask the managers whether succeeded items have files again
    ///
    /// Ids that are not `succeeded`, or no longer in the catalog, are skipped.
    pub async fn verify_found(&self, ids: &[String]) -> CoordinatorResult<Vec<FoundCheck>> {
        let _guard = self.try_guard()?;

        let succeeded: HashSet<String> = self
            .ledger
            .list_by_state(MigrationState::Succeeded)
            .await?
            .into_iter()
            .map(|record| record.item_id)
            .collect();

        let wanted: Vec<String> = ids.iter().filter(|id| succeeded.contains(*id)).cloned().collect();
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let items = self.catalog.list_items(&CatalogFilter::ids(wanted)).await?;

        let mut checks = Vec::with_capacity(items.len());
        for item in &items {
            self.gate.acquire().await;
            match self.remote.check_present(item).await {
                Ok(found) => {
                    self.ledger.set_found(&item.id, found).await?;
                    checks.push(FoundCheck {
                        item_id: item.id.clone(),
                        found: Some(found),
                        error: None,
                    });
                }
                Err(e) => {
                    let fatal = e.is_unauthorized();
                    checks.push(FoundCheck {
                        item_id: item.id.clone(),
                        found: None,
                        error: Some(e.to_string()),
                    });
                    if fatal {
                        tracing::error!(error = %e, "Stopping found-status check");
                        break;
                    }
                }
            }
        }

        Ok(checks)
    }

    /// Check both managers' reachability and API keys
    pub async fn test_connections(&self) -> Vec<ConnectionCheck> {
        let mut checks = Vec::with_capacity(2);
        for manager in [Manager::Radarr, Manager::Sonarr] {
            let check = match self.remote.test_connection(manager).await {
                Ok(version) => ConnectionCheck {
                    manager,
                    ok: true,
                    version: Some(version),
                    error: None,
                },
                Err(e) => ConnectionCheck {
                    manager,
                    ok: false,
                    version: None,
                    error: Some(e.to_string()),
                },
            };
            checks.push(check);
        }
        checks
    }
}
