//! Pending message types for the per-session analysis queue.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScribeError;

/// What the queued event asks the analyzer to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    /// Distill one tool invocation.
    Observation,
    /// Produce an end-of-session summary.
    Summarize,
}

impl PendingKind {
    /// Returns the string representation of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Observation => "observation",
            Self::Summarize => "summarize",
        }
    }
}

impl FromStr for PendingKind {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "observation" => Ok(Self::Observation),
            "summarize" => Ok(Self::Summarize),
            other => Err(ScribeError::InvalidInput(format!("unknown pending kind: {other}"))),
        }
    }
}

/// Queue state of a pending message.
///
/// A message leaves `Pending` only after the orchestrator has persisted (or
/// intentionally dropped) the analyzer's reply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingStatus {
    /// Waiting for (or in flight to) the analyzer.
    Pending,
    /// Reply persisted; retained briefly for the viewer.
    Processed,
}

impl PendingStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Pending => "pending",
            Self::Processed => "processed",
        }
    }
}

impl FromStr for PendingStatus {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            other => Err(ScribeError::InvalidInput(format!("unknown pending status: {other}"))),
        }
    }
}

/// Payload for enqueueing a new pending message, before the store assigns
/// an id and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDraft {
    pub kind: PendingKind,
    pub tool_name: Option<String>,
    pub tool_input: Option<String>,
    pub tool_response: Option<String>,
    pub cwd: Option<String>,
    pub prompt_number: Option<u32>,
    pub last_user_message: Option<String>,
    pub last_assistant_message: Option<String>,
}

impl Default for PendingDraft {
    fn default() -> Self {
        Self {
            kind: PendingKind::Observation,
            tool_name: None,
            tool_input: None,
            tool_response: None,
            cwd: None,
            prompt_number: None,
            last_user_message: None,
            last_assistant_message: None,
        }
    }
}

/// One deferred analyzer input, durably queued per session.
///
/// `tool_input` and `tool_response` are opaque JSON blobs; the orchestrator
/// forwards them without inspecting their schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMessage {
    /// Monotonic store id; delivery order within a session follows it.
    pub id: i64,
    /// Assistant-side session id this message belongs to.
    pub content_session_id: String,
    /// What to ask the analyzer.
    pub kind: PendingKind,
    /// Queue state.
    pub status: PendingStatus,
    /// Name of the tool that was invoked.
    pub tool_name: Option<String>,
    /// Opaque tool input blob.
    pub tool_input: Option<String>,
    /// Opaque tool response blob.
    pub tool_response: Option<String>,
    /// Working directory at invocation time.
    pub cwd: Option<String>,
    /// Prompt number the event arrived under.
    pub prompt_number: Option<u32>,
    /// Last user message snapshot (summarize only).
    pub last_user_message: Option<String>,
    /// Last assistant message snapshot (summarize only).
    pub last_assistant_message: Option<String>,
    /// Enqueue time, epoch milliseconds.
    pub created_at_epoch: i64,
    /// Processing completion time, epoch milliseconds.
    pub completed_at_epoch: Option<i64>,
}
