//! Integration tests for the Batch Orchestrator and Progress Publisher
//!
//! Tests cover:
//! - Candidate selection: size cap, default size, exclusion of succeeded items
//! - Per-item failures, transient retry, unauthorized abort
//! - Pacing between consecutive remote calls
//! - Single-run guard and cooperative cancellation
//! - Startup reconciliation of orphaned records
//! - Re-queue and found-status checks

mod helpers;

use helpers::*;
use ndm_common::MigrationEvent;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use ndm_coordinator::models::{BatchStatus, CatalogFilter, MigrationState, SelectionRequest};
use ndm_coordinator::remote::RemoteError;
use ndm_coordinator::services::{BatchOrchestrator, ProgressPublisher, MAX_ATTEMPTS};
use ndm_coordinator::CoordinatorError;

async fn state_of(ctx: &TestContext, id: &str) -> Option<MigrationState> {
    ctx.ledger.find(id).await.unwrap().map(|record| record.state)
}

// =============================================================================
// Candidate selection
// =============================================================================

#[tokio::test]
async fn test_selection_never_exceeds_max_batch_size() {
    let ctx = TestContext::new(movies(80), settings(10, 50, Duration::ZERO)).await;

    let request = SelectionRequest {
        limit: Some(500),
        ..Default::default()
    };
    let selected = ctx.orchestrator.select_candidates(&request).await.unwrap();
    assert_eq!(selected.len(), 50);

    let default = ctx
        .orchestrator
        .select_candidates(&SelectionRequest::default())
        .await
        .unwrap();
    assert_eq!(default.len(), 10);
    assert_eq!(default[0].id, movie(1).id);
}

#[tokio::test]
async fn test_selection_excludes_succeeded_until_requeued() {
    let ctx = TestContext::new(movies(5), unpaced()).await;

    let first = movie(1);
    ctx.orchestrator
        .run_batch(vec![first.clone()], CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(state_of(&ctx, &first.id).await, Some(MigrationState::Succeeded));

    let selected = ctx
        .orchestrator
        .select_candidates(&SelectionRequest::default())
        .await
        .unwrap();
    assert_eq!(selected.len(), 4);
    assert!(selected.iter().all(|item| item.id != first.id));

    let requeue = ctx.orchestrator.requeue(&[first.id.clone()]).await.unwrap();
    assert_eq!(requeue.reset, 1);

    let selected = ctx
        .orchestrator
        .select_candidates(&SelectionRequest::default())
        .await
        .unwrap();
    assert_eq!(selected.len(), 5);
    assert_eq!(selected[0].id, first.id);
}

#[tokio::test]
async fn test_selection_keeps_failed_items() {
    let ctx = TestContext::new(movies(3), unpaced()).await;
    let item = movie(2);
    ctx.remote
        .script(&item.id, vec![Err(RemoteError::NotFound("missing".to_string()))]);

    ctx.orchestrator
        .run_batch(movies(3), CancellationToken::new())
        .await
        .unwrap();

    let selected = ctx
        .orchestrator
        .select_candidates(&SelectionRequest::default())
        .await
        .unwrap();
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0].id, item.id);
}

#[tokio::test]
async fn test_selection_with_explicit_ids_keeps_catalog_order() {
    let ctx = TestContext::new(movies(5), unpaced()).await;

    let request = SelectionRequest {
        filter: CatalogFilter::ids(vec![movie(4).id, movie(2).id]),
        limit: None,
    };
    let selected = ctx.orchestrator.select_candidates(&request).await.unwrap();

    let ids: Vec<String> = selected.into_iter().map(|item| item.id).collect();
    assert_eq!(ids, vec![movie(2).id, movie(4).id]);
}

#[tokio::test]
async fn test_selection_fails_when_catalog_unavailable() {
    let ctx = TestContext::new(movies(3), unpaced()).await;
    ctx.catalog.set_unavailable(true);

    let err = ctx
        .orchestrator
        .select_candidates(&SelectionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::SourceUnavailable(_)));
}

// =============================================================================
// Batch processing
// =============================================================================

#[tokio::test]
async fn test_batch_records_every_item() {
    let items = vec![movie(1), episode(1), movie(2)];
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.remote
        .script(&movie(2).id, vec![Err(RemoteError::NotFound("not in library".to_string()))]);

    let outcome = ctx
        .orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.not_attempted, 0);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].item_id, movie(2).id);

    let record = ctx.ledger.get(&movie(2).id).await.unwrap();
    assert_eq!(record.state, MigrationState::Failed);
    assert_eq!(record.attempt_count, 1);
    assert!(record.last_error.unwrap().contains("not in library"));

    let calls: Vec<String> = ctx.remote.calls().into_iter().map(|(id, _)| id).collect();
    let expected: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    assert_eq!(calls, expected);
}

#[tokio::test]
async fn test_unauthorized_on_third_item_aborts_batch() {
    let items = movies(6);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.remote.script(
        &items[2].id,
        vec![Err(RemoteError::Unauthorized {
            manager: ndm_coordinator::models::Manager::Radarr,
            message: "HTTP 401".to_string(),
        })],
    );

    let outcome = ctx
        .orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(state_of(&ctx, &items[0].id).await, Some(MigrationState::Succeeded));
    assert_eq!(state_of(&ctx, &items[1].id).await, Some(MigrationState::Succeeded));
    assert_eq!(state_of(&ctx, &items[2].id).await, Some(MigrationState::Failed));
    for item in &items[3..] {
        assert_eq!(state_of(&ctx, &item.id).await, Some(MigrationState::Pending));
    }

    assert_eq!(outcome.succeeded, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.not_attempted, 3);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].item_id, items[2].id);
    match &outcome.status {
        BatchStatus::Aborted { reason } => {
            assert_eq!(reason, &outcome.errors[0].reason);
            assert!(reason.contains("API key"));
        }
        other => panic!("expected aborted batch, got {:?}", other),
    }

    // No call after the unauthorized one
    assert_eq!(ctx.remote.call_count(), 3);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let items = movies(2);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.remote.script(
        &items[0].id,
        vec![
            Err(RemoteError::Transient("HTTP 503".to_string())),
            Err(RemoteError::Transient("timed out".to_string())),
            Ok(()),
        ],
    );
    ctx.remote.script(
        &items[1].id,
        vec![Err(RemoteError::Transient("HTTP 502".to_string())); MAX_ATTEMPTS as usize],
    );

    let outcome = ctx
        .orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed, 1);
    assert_eq!(ctx.remote.call_count(), 2 * MAX_ATTEMPTS as usize);

    let recovered = ctx.ledger.get(&items[0].id).await.unwrap();
    assert_eq!(recovered.state, MigrationState::Succeeded);
    assert_eq!(recovered.attempt_count, 1);

    let exhausted = ctx.ledger.get(&items[1].id).await.unwrap();
    assert_eq!(exhausted.state, MigrationState::Failed);
    assert!(exhausted.last_error.unwrap().contains("HTTP 502"));
}

#[tokio::test]
async fn test_rejected_requests_are_not_retried() {
    let items = movies(1);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.remote.script(
        &items[0].id,
        vec![Err(RemoteError::Rejected {
            code: 400,
            message: "bad command".to_string(),
        })],
    );

    let outcome = ctx
        .orchestrator
        .run_batch(items, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.failed, 1);
    assert_eq!(ctx.remote.call_count(), 1);
}

#[tokio::test]
async fn test_failed_item_retried_in_later_batch() {
    let items = movies(1);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.remote
        .script(&items[0].id, vec![Err(RemoteError::NotFound("missing".to_string()))]);

    ctx.orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();
    ctx.orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();

    let record = ctx.ledger.get(&items[0].id).await.unwrap();
    assert_eq!(record.state, MigrationState::Succeeded);
    assert_eq!(record.attempt_count, 2);
    assert_eq!(record.last_error, None);
}

#[tokio::test]
async fn test_remote_calls_are_paced() {
    let delay = Duration::from_millis(200);
    let items = vec![movie(1), episode(1), movie(2), episode(2), movie(3)];
    let ctx = TestContext::new(items.clone(), settings(10, 50, delay)).await;

    ctx.orchestrator
        .run_batch(items, CancellationToken::new())
        .await
        .unwrap();

    // Timestamps are taken inside the fake, a few microseconds after the gate
    // stamps its slot
    let tolerance = Duration::from_millis(2);

    let calls = ctx.remote.calls();
    assert_eq!(calls.len(), 5);
    for pair in calls.windows(2) {
        let gap = pair[1].1 - pair[0].1;
        assert!(gap + tolerance >= delay, "calls only {:?} apart", gap);
    }
}

// =============================================================================
// Concurrency and cancellation
// =============================================================================

#[tokio::test]
async fn test_second_batch_rejected_while_running() {
    let running = movies(3);
    let other = vec![episode(1), episode(2)];
    let mut all = running.clone();
    all.extend(other.clone());

    let ctx = TestContext::with_remote(
        all,
        unpaced(),
        SimulatedRemote::with_latency(Duration::from_millis(100)),
    )
    .await;

    let handle = ctx.orchestrator.start_batch(running.clone()).await.unwrap();

    let err = ctx
        .orchestrator
        .run_batch(other.clone(), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::BatchInProgress));
    assert!(matches!(
        ctx.orchestrator.start_batch(other.clone()).await,
        Err(CoordinatorError::BatchInProgress)
    ));
    assert!(matches!(
        ctx.orchestrator.requeue(&[running[0].id.clone()]).await,
        Err(CoordinatorError::BatchInProgress)
    ));

    for item in &other {
        assert_eq!(state_of(&ctx, &item.id).await, None);
    }

    let outcome = handle.join().await.unwrap();
    assert_eq!(outcome.succeeded, 3);

    // Guard released once the batch finished
    let outcome = ctx
        .orchestrator
        .run_batch(other, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.succeeded, 2);
}

#[tokio::test]
async fn test_cancellation_leaves_nothing_in_progress() {
    let items = movies(6);
    let ctx = TestContext::with_remote(
        items.clone(),
        settings(10, 50, Duration::from_millis(50)),
        SimulatedRemote::with_latency(Duration::from_millis(20)),
    )
    .await;

    let handle = ctx.orchestrator.start_batch(items.clone()).await.unwrap();

    while ctx.remote.call_count() < 2 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    handle.cancel();
    let outcome = handle.join().await.unwrap();

    assert_eq!(outcome.status, BatchStatus::Cancelled);
    assert!(outcome.succeeded >= 2);
    assert!(outcome.succeeded < items.len());
    assert_eq!(outcome.succeeded, ctx.remote.call_count());
    assert_eq!(outcome.not_attempted, items.len() - outcome.succeeded);

    assert!(ctx
        .ledger
        .list_by_state(MigrationState::InProgress)
        .await
        .unwrap()
        .is_empty());
    let pending = ctx.ledger.list_by_state(MigrationState::Pending).await.unwrap();
    assert_eq!(pending.len(), outcome.not_attempted);
    assert!(ctx.orchestrator.active_batch().await.is_none());
}

#[tokio::test]
async fn test_cancel_before_first_item() {
    let items = movies(3);
    let ctx = TestContext::new(items.clone(), unpaced()).await;

    let token = CancellationToken::new();
    token.cancel();
    let outcome = ctx.orchestrator.run_batch(items, token).await.unwrap();

    assert_eq!(outcome.status, BatchStatus::Cancelled);
    assert_eq!(outcome.not_attempted, 3);
    assert_eq!(ctx.remote.call_count(), 0);
}

#[tokio::test]
async fn test_started_batch_cancellable_immediately() {
    let items = movies(3);
    let ctx = TestContext::new(items.clone(), unpaced()).await;

    let handle = ctx.orchestrator.start_batch(items).await.unwrap();
    let active = ctx.orchestrator.active_batch().await.unwrap();
    assert_eq!(active.batch_id, handle.batch_id);
    assert_eq!(active.size, 3);

    assert_eq!(ctx.orchestrator.cancel_active().await, Some(handle.batch_id));

    let outcome = handle.join().await.unwrap();
    assert_eq!(outcome.status, BatchStatus::Cancelled);
    assert_eq!(outcome.not_attempted, 3);
    assert_eq!(ctx.remote.call_count(), 0);
    assert!(ctx.orchestrator.active_batch().await.is_none());
}

#[tokio::test]
async fn test_wait_idle_outlasts_cancelled_batch() {
    let items = movies(4);
    let ctx = TestContext::with_remote(
        items.clone(),
        unpaced(),
        SimulatedRemote::with_latency(Duration::from_millis(100)),
    )
    .await;

    let handle = ctx.orchestrator.start_batch(items).await.unwrap();
    while ctx.remote.call_count() < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    ctx.orchestrator.cancel_active().await;

    // The in-flight item settles before wait_idle returns
    ctx.orchestrator.wait_idle().await;

    assert!(ctx
        .ledger
        .list_by_state(MigrationState::InProgress)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(state_of(&ctx, &movie(1).id).await, Some(MigrationState::Succeeded));
    assert!(ctx.orchestrator.active_batch().await.is_none());
    let outcome = ctx.orchestrator.last_outcome().await.unwrap();
    assert_eq!(outcome.batch_id, handle.batch_id);
    assert_eq!(outcome.status, BatchStatus::Cancelled);
}

// =============================================================================
// Startup, requeue, found status
// =============================================================================

#[tokio::test]
async fn test_startup_reconciles_orphans_once() {
    let items = movies(3);
    let ctx = TestContext::new(items.clone(), unpaced()).await;

    // Simulate a crash mid-batch
    ctx.ledger
        .upsert(&items[0], MigrationState::InProgress, None)
        .await
        .unwrap();
    ctx.ledger
        .upsert(&items[1], MigrationState::InProgress, None)
        .await
        .unwrap();

    let mut rx = ctx.events.subscribe();
    let restarted = BatchOrchestrator::start(
        ctx.catalog.clone(),
        ctx.ledger.clone(),
        ctx.remote.clone(),
        ctx.events.clone(),
        unpaced(),
    )
    .await
    .unwrap();

    assert_eq!(restarted.reconciled_at_startup(), 2);
    assert_eq!(ctx.ledger.reconcile_orphans().await.unwrap(), 0);
    match rx.recv().await.unwrap() {
        MigrationEvent::LedgerReconciled { count, .. } => assert_eq!(count, 2),
        other => panic!("unexpected event {:?}", other),
    }

    let record = ctx.ledger.get(&items[0].id).await.unwrap();
    assert_eq!(record.state, MigrationState::Failed);
    assert_eq!(record.last_error.as_deref(), Some("interrupted"));

    // Interrupted items are candidates again
    let selected = restarted
        .select_candidates(&SelectionRequest::default())
        .await
        .unwrap();
    assert_eq!(selected.len(), 3);
}

#[tokio::test]
async fn test_requeue_reports_unknown_ids() {
    let items = movies(1);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();

    let outcome = ctx
        .orchestrator
        .requeue(&[items[0].id.clone(), "/content/movies/Unknown".to_string()])
        .await
        .unwrap();

    assert_eq!(outcome.reset, 1);
    assert_eq!(outcome.unknown, vec!["/content/movies/Unknown".to_string()]);

    let record = ctx.ledger.get(&items[0].id).await.unwrap();
    assert_eq!(record.state, MigrationState::Pending);
    assert_eq!(record.attempt_count, 1);
}

#[tokio::test]
async fn test_verify_found_checks_only_succeeded_items() {
    let items = movies(3);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.orchestrator
        .run_batch(items[..2].to_vec(), CancellationToken::new())
        .await
        .unwrap();
    ctx.remote.set_present(&items[0].id, true);

    let ids: Vec<String> = items.iter().map(|item| item.id.clone()).collect();
    let checks = ctx.orchestrator.verify_found(&ids).await.unwrap();

    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0].found, Some(true));
    assert_eq!(checks[1].found, Some(false));

    assert_eq!(
        ctx.ledger.get(&items[0].id).await.unwrap().found_in_manager,
        Some(true)
    );
    assert_eq!(
        ctx.ledger.get(&items[1].id).await.unwrap().found_in_manager,
        Some(false)
    );
    assert_eq!(state_of(&ctx, &items[2].id).await, None);
}

#[tokio::test]
async fn test_connection_checks_report_each_manager() {
    let ctx = TestContext::new(Vec::new(), unpaced()).await;
    let checks = ctx.orchestrator.test_connections().await;

    assert_eq!(checks.len(), 2);
    assert!(checks[0].ok);
    assert_eq!(checks[0].version.as_deref(), Some("5.2.6"));
    assert!(!checks[1].ok);
    assert!(checks[1].error.as_ref().unwrap().contains("not configured"));
}

// =============================================================================
// Progress
// =============================================================================

#[tokio::test]
async fn test_snapshot_reflects_committed_ledger() {
    let items = movies(4);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    ctx.remote
        .script(&items[3].id, vec![Err(RemoteError::NotFound("gone".to_string()))]);

    let publisher = ProgressPublisher::new(ctx.orchestrator.clone());
    let empty = publisher.snapshot().await.unwrap();
    assert_eq!(empty.total(), 0);
    assert!(empty.last_error.is_none());

    ctx.orchestrator
        .run_batch(items.clone(), CancellationToken::new())
        .await
        .unwrap();

    let snapshot = publisher.snapshot().await.unwrap();
    assert_eq!(snapshot.succeeded, 3);
    assert_eq!(snapshot.failed, 1);
    assert_eq!(snapshot.pending, 0);
    assert_eq!(snapshot.in_progress, 0);
    assert_eq!(snapshot.current_batch_size, 0);
    let last_error = snapshot.last_error.unwrap();
    assert_eq!(last_error.item_id, items[3].id);
    assert!(last_error.message.contains("gone"));
}

#[tokio::test]
async fn test_snapshot_during_batch_shows_active_size() {
    let items = movies(4);
    let ctx = TestContext::with_remote(
        items.clone(),
        unpaced(),
        SimulatedRemote::with_latency(Duration::from_millis(100)),
    )
    .await;
    let publisher = ProgressPublisher::new(ctx.orchestrator.clone());

    let handle = ctx.orchestrator.start_batch(items.clone()).await.unwrap();
    while ctx.remote.call_count() < 1 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let snapshot = publisher.snapshot().await.unwrap();
    assert_eq!(snapshot.current_batch_size, 4);
    assert_eq!(snapshot.active_batch.as_ref().unwrap().batch_id, handle.batch_id);
    assert_eq!(snapshot.total(), 4);

    handle.join().await.unwrap();
    let snapshot = publisher.snapshot().await.unwrap();
    assert_eq!(snapshot.current_batch_size, 0);
    assert_eq!(snapshot.succeeded, 4);
}

#[tokio::test]
async fn test_batch_emits_progress_events() {
    let items = movies(2);
    let ctx = TestContext::new(items.clone(), unpaced()).await;
    let mut rx = ctx.events.subscribe();

    ctx.orchestrator
        .run_batch(items, CancellationToken::new())
        .await
        .unwrap();

    let mut types = Vec::new();
    while let Ok(event) = rx.try_recv() {
        types.push(event.event_type());
    }
    assert_eq!(
        types,
        vec![
            "BatchStarted",
            "ItemStarted",
            "ItemCompleted",
            "ItemStarted",
            "ItemCompleted",
            "BatchFinished",
        ]
    );
}
