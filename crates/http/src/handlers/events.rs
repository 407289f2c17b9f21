//! Inbound tool-activity events from the hosting harness.

use std::str::FromStr as _;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use toolscribe_core::{PendingDraft, PendingKind};

use crate::api_error::ApiError;
use crate::query_types::InboundEvent;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub queued: bool,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "messageId")]
    pub message_id: i64,
}

fn blob_to_string(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

/// Accept one inbound event: ensure the session runs, record any new user
/// prompt, and durably queue the event for analysis.
pub async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<EventAccepted>, ApiError> {
    let kind = PendingKind::from_str(&event.kind)
        .map_err(|_invalid| ApiError::BadRequest(format!("unknown event kind: {}", event.kind)))?;
    if event.session_id.is_empty() {
        return Err(ApiError::BadRequest("sessionId must not be empty".to_owned()));
    }

    let (session, created) = state
        .manager
        .initialize_session(&event.session_id, &event.project, event.user_prompt.as_deref())
        .await?;
    if !created {
        if let Some(ref prompt) = event.user_prompt {
            state.manager.record_prompt(&session, prompt).await?;
        }
    }

    let draft = PendingDraft {
        kind,
        tool_name: event.tool_name.clone(),
        tool_input: blob_to_string(event.tool_input.as_ref()),
        tool_response: blob_to_string(event.tool_response.as_ref()),
        cwd: event.cwd.clone(),
        prompt_number: None,
        last_user_message: event.last_user_message.clone(),
        last_assistant_message: event.last_assistant_message.clone(),
    };
    let message_id = state.manager.enqueue(&session, draft).await?;

    Ok(Json(EventAccepted { queued: true, session_id: event.session_id, message_id }))
}

#[derive(Debug, Serialize)]
pub struct CancelAccepted {
    pub cancelled: bool,
}

/// Fire a session's cancellation handle. Persisted observations stay; the
/// orchestrator drains and its unprocessed messages await redelivery.
pub async fn cancel_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<CancelAccepted>, ApiError> {
    if state.manager.get(&session_id).is_none() {
        return Err(ApiError::NotFound(format!("no active session '{session_id}'")));
    }
    state.manager.cancel_session(&session_id);
    Ok(Json(CancelAccepted { cancelled: true }))
}
