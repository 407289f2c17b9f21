//! Paginated read endpoints for the viewer.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use toolscribe_core::{
    Observation, PendingMessage, SessionSummary, UserPrompt, MAX_QUERY_LIMIT,
    PROCESSED_KEEP_LAST,
};

use crate::api_error::ApiError;
use crate::blocking::blocking_json;
use crate::query_types::PageQuery;
use crate::AppState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn get_observations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Observation>>, ApiError> {
    let store = Arc::clone(&state.store);
    let limit = query.limit.min(MAX_QUERY_LIMIT);
    blocking_json(move || {
        store.observations_page(query.project.as_deref(), query.after_id, limit)
    })
    .await
}

pub async fn get_summaries(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let store = Arc::clone(&state.store);
    let limit = query.limit.min(MAX_QUERY_LIMIT);
    blocking_json(move || store.summaries_page(query.project.as_deref(), query.after_id, limit))
        .await
}

pub async fn get_prompts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<UserPrompt>>, ApiError> {
    let store = Arc::clone(&state.store);
    let limit = query.limit.min(MAX_QUERY_LIMIT);
    blocking_json(move || store.prompts_page(query.project.as_deref(), query.after_id, limit))
        .await
}

pub async fn get_recent_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PendingMessage>>, ApiError> {
    let store = Arc::clone(&state.store);
    blocking_json(move || store.recent_messages(PROCESSED_KEEP_LAST)).await
}
