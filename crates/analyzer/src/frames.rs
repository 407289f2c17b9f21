//! Wire frames exchanged with the analyzer subprocess.

use serde::Serialize;
use serde_json::Value;
use toolscribe_core::{PendingKind, PendingMessage, Result};

/// Input frame written to the analyzer's stdin, one JSON object per line.
///
/// Exactly one `Init` or `Continuation` frame opens the stream; after that
/// only `Observation` and `Summarize` frames follow.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputFrame {
    /// Opens a brand-new session.
    Init {
        project: String,
        session_id: String,
        user_prompt: String,
        mode: String,
    },
    /// Opens a resumed session (`last_prompt_number > 1` at start).
    Continuation {
        project: String,
        session_id: String,
        user_prompt: String,
        prompt_number: u32,
        mode: String,
    },
    /// One tool invocation to distill.
    Observation {
        tool_name: String,
        tool_input: Value,
        tool_response: Value,
        cwd: String,
    },
    /// Ask for an end-of-session roll-up.
    Summarize {
        last_user_message: String,
        last_assistant_message: String,
    },
}

/// Parse an opaque blob column: JSON where possible, a JSON string otherwise.
fn blob_to_value(raw: Option<&str>) -> Value {
    match raw {
        Some(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_owned())),
        None => Value::Null,
    }
}

impl InputFrame {
    /// Translate a queued message into the frame the analyzer expects.
    /// The blob payloads are forwarded without schema inspection.
    #[must_use]
    pub fn from_pending(msg: &PendingMessage) -> Self {
        match msg.kind {
            PendingKind::Observation => Self::Observation {
                tool_name: msg.tool_name.clone().unwrap_or_default(),
                tool_input: blob_to_value(msg.tool_input.as_deref()),
                tool_response: blob_to_value(msg.tool_response.as_deref()),
                cwd: msg.cwd.clone().unwrap_or_default(),
            },
            PendingKind::Summarize => Self::Summarize {
                last_user_message: msg.last_user_message.clone().unwrap_or_default(),
                last_assistant_message: msg.last_assistant_message.clone().unwrap_or_default(),
            },
        }
    }

    /// Serialize to a single stdin line (no trailing newline).
    ///
    /// # Errors
    /// Returns error if serialization fails.
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Token usage attached to an assistant reply.
///
/// `cache_read_input_tokens` is carried but never counted toward discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// One parsed reply line from the analyzer's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Assistant text with its usage record.
    Assistant {
        text: String,
        usage: Usage,
        /// Analyzer-side session id, when the frame reports one.
        session_id: Option<String>,
    },
    /// Result/status frame; carries no payload of interest.
    Status,
}

fn content_to_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| {
                if block.get("type").and_then(Value::as_str) == Some("text") {
                    block.get("text").and_then(Value::as_str)
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

/// Parse one stdout line. Unparseable lines yield `None` and are skipped by
/// the caller; anything that is not an assistant frame is a `Status`.
#[must_use]
pub fn parse_reply_line(line: &str) -> Option<Reply> {
    let value: Value = serde_json::from_str(line.trim()).ok()?;
    let kind = value.get("type").and_then(Value::as_str)?;
    if kind != "assistant" {
        return Some(Reply::Status);
    }

    let message = value.get("message")?;
    let text = message.get("content").map(content_to_text).unwrap_or_default();
    let usage = message
        .get("usage")
        .and_then(|u| serde_json::from_value(u.clone()).ok())
        .unwrap_or_default();
    let session_id = value
        .get("session_id")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned);

    Some(Reply::Assistant { text, usage, session_id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_frame_wire_shape() {
        let frame = InputFrame::Init {
            project: "proj".to_owned(),
            session_id: "sess".to_owned(),
            user_prompt: "do it".to_owned(),
            mode: "observe".to_owned(),
        };
        let json: Value = serde_json::from_str(&frame.to_line().unwrap()).unwrap();
        assert_eq!(json["type"], "init");
        assert_eq!(json["session_id"], "sess");
    }

    #[test]
    fn pending_blobs_forward_as_json_when_possible() {
        let msg = PendingMessage {
            id: 1,
            content_session_id: "s".to_owned(),
            kind: PendingKind::Observation,
            status: toolscribe_core::PendingStatus::Pending,
            tool_name: Some("read".to_owned()),
            tool_input: Some(r#"{"path":"/tmp/x"}"#.to_owned()),
            tool_response: Some("plain text output".to_owned()),
            cwd: Some("/work".to_owned()),
            prompt_number: Some(2),
            last_user_message: None,
            last_assistant_message: None,
            created_at_epoch: 0,
            completed_at_epoch: None,
        };
        let frame = InputFrame::from_pending(&msg);
        let json: Value = serde_json::from_str(&frame.to_line().unwrap()).unwrap();
        assert_eq!(json["type"], "observation");
        assert_eq!(json["tool_input"]["path"], "/tmp/x");
        assert_eq!(json["tool_response"], "plain text output");
    }

    #[test]
    fn assistant_reply_with_block_content() {
        let line = r#"{"type":"assistant","session_id":"agent-1","message":{"content":[{"type":"text","text":"hello "},{"type":"text","text":"world"}],"usage":{"input_tokens":10,"output_tokens":5,"cache_read_input_tokens":99}}}"#;
        let reply = parse_reply_line(line).unwrap();
        match reply {
            Reply::Assistant { text, usage, session_id } => {
                assert_eq!(text, "hello world");
                assert_eq!(usage.input_tokens, 10);
                assert_eq!(usage.cache_creation_input_tokens, 0);
                assert_eq!(usage.cache_read_input_tokens, 99);
                assert_eq!(session_id.as_deref(), Some("agent-1"));
            },
            Reply::Status => panic!("expected assistant reply"),
        }
    }

    #[test]
    fn result_frames_are_status() {
        let line = r#"{"type":"result","subtype":"success","total_cost_usd":0.01}"#;
        assert_eq!(parse_reply_line(line), Some(Reply::Status));
    }

    #[test]
    fn garbage_lines_are_skipped() {
        assert!(parse_reply_line("not json at all").is_none());
        assert!(parse_reply_line("").is_none());
    }
}
