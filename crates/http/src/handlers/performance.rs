//! Performance read endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use toolscribe_worker::{parse_since, ProcessingTimes, QueueHistory};

use crate::query_types::PerformanceQuery;
use crate::AppState;

pub async fn performance_times(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PerformanceQuery>,
) -> Json<ProcessingTimes> {
    let since = parse_since(query.since.as_deref());
    Json(state.tracker.get_processing_times(since, query.limit))
}

pub async fn performance_queue(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PerformanceQuery>,
) -> Json<QueueHistory> {
    let since = parse_since(query.since.as_deref());
    Json(state.tracker.get_queue_history(since))
}
