//! Session types for analyzer work units.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ScribeError;

/// One unit of analyzer work, keyed by the assistant-side session id.
///
/// The assistant-side id is shared across continuations of the same logical
/// conversation; `last_prompt_number` grows monotonically across them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Monotonic internal id.
    pub id: i64,
    /// Assistant-side session id (opaque, shared across continuations).
    pub content_session_id: String,
    /// Analyzer-side session id, once the subprocess has reported one.
    pub agent_session_id: Option<String>,
    /// Project name.
    pub project: String,
    /// Current user prompt text.
    pub user_prompt: Option<String>,
    /// Monotonically growing prompt counter, starts at 1.
    pub last_prompt_number: u32,
    /// Cumulative analyzer input tokens (including cache creation).
    pub input_tokens: u64,
    /// Cumulative analyzer output tokens.
    pub output_tokens: u64,
    /// Row lifecycle state.
    pub status: SessionStatus,
    /// Session start, epoch milliseconds.
    pub started_at_epoch: i64,
}

/// Session lifecycle state in the store.
///
/// A failed orchestrator leaves the row `Active` so a later inbound event can
/// resurrect the session and retry its pending messages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Session is active (or was abandoned by a failed orchestrator).
    Active,
    /// Orchestrator loop completed cleanly.
    Completed,
}

impl SessionStatus {
    /// Returns the string representation of the session status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for SessionStatus {
    type Err = ScribeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            other => Err(ScribeError::InvalidInput(format!("unknown session status: {other}"))),
        }
    }
}

/// End-of-session roll-up produced from a `summarize` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Monotonic store id.
    pub id: i64,
    /// Assistant-side session id.
    pub content_session_id: String,
    /// Project name.
    pub project: String,
    /// What was requested.
    pub request: Option<String>,
    /// What was investigated.
    pub investigated: Option<String>,
    /// What was learned.
    pub learned: Option<String>,
    /// What was completed.
    pub completed: Option<String>,
    /// Next steps.
    pub next_steps: Option<String>,
    /// Additional notes.
    pub notes: Option<String>,
    /// Prompt number at summary time.
    pub prompt_number: Option<u32>,
    /// Token spend attributed to the producing reply.
    pub discovery_tokens: u64,
    /// Creation time, epoch milliseconds.
    pub created_at_epoch: i64,
}

/// Parsed summary payload before it is persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SummaryDraft {
    #[serde(default)]
    pub request: Option<String>,
    #[serde(default)]
    pub investigated: Option<String>,
    #[serde(default)]
    pub learned: Option<String>,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub next_steps: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Recorded user utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPrompt {
    /// Monotonic store id.
    pub id: i64,
    /// Assistant-side session id.
    pub content_session_id: String,
    /// Project name.
    pub project: String,
    /// Prompt number in session (1-based).
    pub prompt_number: u32,
    /// Prompt text content.
    pub prompt_text: String,
    /// Creation time, epoch milliseconds.
    pub created_at_epoch: i64,
}
