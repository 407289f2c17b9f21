//! Token-economics read endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use toolscribe_core::{TokenSummary, PROJECTION_DEFAULT_COUNT};
use toolscribe_worker::{
    CompressionStats, EndlessProjection, ProjectBreakdown, TimeGranularity, TimeSeriesStats,
    TypeBreakdown,
};

use crate::api_error::ApiError;
use crate::query_types::TokenQuery;
use crate::AppState;

pub async fn tokens_summary(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenSummary>, ApiError> {
    let summary = state
        .metrics
        .summary(query.project.as_deref(), query.since.as_deref())
        .await?;
    Ok(Json(summary))
}

pub async fn tokens_by_project(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<ProjectBreakdown>, ApiError> {
    let breakdown = state.metrics.by_project(query.limit, query.since.as_deref()).await?;
    Ok(Json(breakdown))
}

pub async fn tokens_by_type(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TypeBreakdown>, ApiError> {
    let breakdown = state
        .metrics
        .by_type(query.project.as_deref(), query.since.as_deref())
        .await?;
    Ok(Json(breakdown))
}

pub async fn tokens_time_series(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TimeSeriesStats>, ApiError> {
    let granularity = TimeGranularity::parse(query.granularity.as_deref());
    let series = state
        .metrics
        .time_series(query.project.as_deref(), query.since.as_deref(), granularity)
        .await?;
    Ok(Json(series))
}

pub async fn tokens_compression(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<CompressionStats>, ApiError> {
    let stats = state
        .metrics
        .compression(query.project.as_deref(), query.since.as_deref())
        .await?;
    Ok(Json(stats))
}

pub async fn tokens_projection(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<EndlessProjection>, ApiError> {
    let count = query.observation_count.unwrap_or(PROJECTION_DEFAULT_COUNT);
    let projection = state.metrics.projection(query.project.as_deref(), count).await?;
    Ok(Json(projection))
}
