//! Helpers for running blocking store reads inside async handlers.

use axum::Json;
use serde::Serialize;
use tokio::task::spawn_blocking;

use crate::api_error::ApiError;

/// Runs a blocking closure and wraps the result in `Json`.
pub async fn blocking_json<T, F>(f: F) -> Result<Json<T>, ApiError>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static + Serialize,
{
    let value = spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("join error: {e}")))??;
    Ok(Json(value))
}
