//! Observation types for distilled tool activity.

use serde::{Deserialize, Serialize};

/// A distilled finding produced by the analyzer for one tool invocation.
///
/// Immutable after insert; `id` is the store's monotonic rowid, so per-session
/// id order matches the order in which the producing frames were fed to the
/// analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonic store id.
    pub id: i64,
    /// Assistant-side session id this observation belongs to.
    pub content_session_id: String,
    /// Project the session was working in.
    pub project: String,
    /// Free-form type tag ("discovery", "bugfix", ...).
    pub observation_type: String,
    /// Concise title.
    pub title: String,
    /// Optional one-line context.
    pub subtitle: Option<String>,
    /// Long-form explanation.
    pub narrative: Option<String>,
    /// Short text body for compact injection.
    pub text: Option<String>,
    /// Specific facts learned (paths, names, decisions).
    pub facts: Vec<String>,
    /// Semantic concepts for categorization.
    pub concepts: Vec<String>,
    /// File paths read.
    pub files_read: Vec<String>,
    /// File paths modified.
    pub files_modified: Vec<String>,
    /// Prompt number within the session.
    pub prompt_number: Option<u32>,
    /// Analyzer token spend attributed to the reply that produced this record.
    pub discovery_tokens: u64,
    /// Creation time, epoch milliseconds.
    pub created_at_epoch: i64,
}

/// Parsed observation payload before it is persisted.
///
/// Field names follow the analyzer's reply envelope; every field is optional
/// on the wire so a sparse record still parses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservationDraft {
    /// Free-form type tag.
    #[serde(rename = "type", default)]
    pub observation_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub subtitle: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub facts: Vec<String>,
    #[serde(default)]
    pub concepts: Vec<String>,
    #[serde(default)]
    pub files_read: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
}

impl ObservationDraft {
    /// True when the draft carries nothing worth persisting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.narrative.is_none()
            && self.text.is_none()
            && self.facts.is_empty()
    }
}
