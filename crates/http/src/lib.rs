//! HTTP API server (Axum)
//!
//! Loopback-bound surface for the hosting tool harness (inbound events) and
//! the viewer UI (token metrics, performance stats, paginated reads, SSE
//! live stream). Authentication is out of scope; bind to 127.0.0.1.

mod api_error;
mod blocking;
mod handlers;
mod query_types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use toolscribe_storage::Store;
use toolscribe_worker::{
    EventBroadcaster, PerformanceTracker, SessionManager, TokenMetricsEngine,
};

pub use api_error::ApiError;
pub use query_types::{InboundEvent, PageQuery, PerformanceQuery, TokenQuery};

/// Shared handler state.
pub struct AppState {
    pub store: Arc<Store>,
    pub manager: Arc<SessionManager>,
    pub metrics: Arc<TokenMetricsEngine>,
    pub tracker: Arc<PerformanceTracker>,
    pub broadcaster: Arc<EventBroadcaster>,
}

/// Build the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/events", post(handlers::post_event))
        .route("/api/sessions/:id/cancel", post(handlers::cancel_session))
        .route("/api/observations", get(handlers::get_observations))
        .route("/api/summaries", get(handlers::get_summaries))
        .route("/api/prompts", get(handlers::get_prompts))
        .route("/api/queue/recent", get(handlers::get_recent_queue))
        .route("/api/tokens/summary", get(handlers::tokens_summary))
        .route("/api/tokens/by-project", get(handlers::tokens_by_project))
        .route("/api/tokens/by-type", get(handlers::tokens_by_type))
        .route("/api/tokens/time-series", get(handlers::tokens_time_series))
        .route("/api/tokens/compression", get(handlers::tokens_compression))
        .route("/api/tokens/projection", get(handlers::tokens_projection))
        .route("/api/performance/queue", get(handlers::performance_queue))
        .route("/api/performance/times", get(handlers::performance_times))
        .route("/api/stream", get(handlers::sse_stream))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
