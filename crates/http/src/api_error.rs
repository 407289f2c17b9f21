//! Typed API error for HTTP handlers.
//!
//! Converts failures into JSON responses with an HTTP status code instead
//! of losing context behind a bare status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// API error with status code and human-readable message.
///
/// Serializes as `{"error": "message"}`. The `Internal` variant logs the
/// real error server-side and returns a static message to the client.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request — invalid input from caller.
    BadRequest(String),
    /// 404 Not Found — requested resource doesn't exist.
    NotFound(String),
    /// 500 Internal Server Error — unexpected failure. Details logged, not
    /// exposed.
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::Internal(err) => {
                tracing::error!(error = ?err, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            },
        };
        let body = serde_json::json!({"error": message});
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}
