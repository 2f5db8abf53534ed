//! Server-Sent Events for batch progress

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use crate::AppState;

/// GET /api/events
///
/// Streams BatchStarted, ItemStarted, ItemCompleted, BatchFinished and
/// LedgerReconciled events.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    ndm_common::sse::create_event_sse_stream("ndm-coordinator", state.event_bus.subscribe())
}
