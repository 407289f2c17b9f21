//! Typed live events fanned out to viewer subscribers.

use serde::{Deserialize, Serialize};

use crate::observation::Observation;
use crate::pending::PendingMessage;
use crate::session::{SessionSummary, UserPrompt};
use crate::tokens::TokenSummary;

/// Event published to live viewers.
///
/// Delivery is lossy best-effort: each subscriber has a bounded buffer and
/// the oldest queued event is dropped on overflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    /// Snapshot sent once when a subscriber joins.
    InitialLoad {
        observations: Vec<Observation>,
        summaries: Vec<SessionSummary>,
        prompts: Vec<UserPrompt>,
        queue: Vec<PendingMessage>,
        #[serde(rename = "isProcessing")]
        is_processing: bool,
        #[serde(rename = "queueDepth")]
        queue_depth: u64,
    },
    /// A new observation was persisted.
    NewObservation { observation: Observation },
    /// A new session summary was persisted.
    NewSummary { summary: SessionSummary },
    /// A user prompt was recorded.
    NewPrompt { prompt: UserPrompt },
    /// The amount of active work changed.
    ProcessingStatus {
        #[serde(rename = "isProcessing")]
        is_processing: bool,
        #[serde(rename = "queueDepth")]
        queue_depth: u64,
    },
    /// Throttled token-economics push.
    TokenUpdate { tokens: TokenSummary, timestamp: i64 },
}

impl LiveEvent {
    /// Wire tag of the event, for logs and SSE event names.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match *self {
            Self::InitialLoad { .. } => "initial_load",
            Self::NewObservation { .. } => "new_observation",
            Self::NewSummary { .. } => "new_summary",
            Self::NewPrompt { .. } => "new_prompt",
            Self::ProcessingStatus { .. } => "processing_status",
            Self::TokenUpdate { .. } => "token_update",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_status_wire_shape() {
        let event = LiveEvent::ProcessingStatus { is_processing: true, queue_depth: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "processing_status");
        assert_eq!(json["isProcessing"], true);
        assert_eq!(json["queueDepth"], 3);
    }

    #[test]
    fn token_update_wire_shape() {
        let event = LiveEvent::TokenUpdate {
            tokens: TokenSummary::from_totals(1, 1, 40),
            timestamp: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "token_update");
        assert_eq!(json["tokens"]["totalDiscoveryTokens"], 40);
        assert_eq!(json["tokens"]["savingsPercent"], 98);
    }
}
