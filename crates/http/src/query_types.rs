//! Request/query types (Deserialize)

use serde::Deserialize;
use toolscribe_core::DEFAULT_QUERY_LIMIT;

const fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

const fn default_project_limit() -> usize {
    10
}

const fn default_times_limit() -> usize {
    100
}

/// Filters shared by the `/api/tokens/*` endpoints.
#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub project: Option<String>,
    pub since: Option<String>,
    #[serde(default = "default_project_limit")]
    pub limit: usize,
    pub granularity: Option<String>,
    #[serde(rename = "observationCount")]
    pub observation_count: Option<usize>,
}

/// Filters for `/api/performance/*`.
#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    pub since: Option<String>,
    #[serde(default = "default_times_limit")]
    pub limit: usize,
}

/// Newest-first keyset pagination for the read endpoints.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub project: Option<String>,
    #[serde(rename = "afterId")]
    pub after_id: Option<i64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

/// Inbound event posted by the hosting tool harness. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub session_id: String,
    pub project: String,
    #[serde(default)]
    pub user_prompt: Option<String>,
    pub kind: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default)]
    pub tool_response: Option<serde_json::Value>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub last_user_message: Option<String>,
    #[serde(default)]
    pub last_assistant_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_event_ignores_unknown_fields() {
        let raw = r#"{
            "sessionId": "sess-1",
            "project": "proj",
            "kind": "observation",
            "toolName": "read",
            "toolInput": {"path": "/tmp/x"},
            "toolResponse": "text output",
            "cwd": "/work",
            "hookVersion": "9.9",
            "somethingNew": {"nested": true}
        }"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.session_id, "sess-1");
        assert_eq!(event.kind, "observation");
        assert_eq!(event.tool_name.as_deref(), Some("read"));
        assert!(event.user_prompt.is_none());
    }

    #[test]
    fn summarize_event_carries_snapshots() {
        let raw = r#"{
            "sessionId": "sess-1",
            "project": "proj",
            "kind": "summarize",
            "lastUserMessage": "wrap it up",
            "lastAssistantMessage": "done"
        }"#;
        let event: InboundEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.last_user_message.as_deref(), Some("wrap it up"));
        assert!(event.tool_name.is_none());
    }
}
