//! Parser for analyzer reply text.
//!
//! The analyzer embeds structured records in its free-text replies as tagged
//! blocks: `<observation>{json}</observation>` for each finding and at most
//! one `<summary>{json}</summary>` roll-up. The parser is total: text with no
//! recognized blocks yields nothing, and malformed records inside a
//! recognized block are skipped silently.

use std::sync::LazyLock;

use regex::Regex;
use toolscribe_core::{ObservationDraft, SummaryDraft};

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static OBSERVATION_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?is)<observation>(.*?)</observation>").unwrap());

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static SUMMARY_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?is)<summary>(.*?)</summary>").unwrap());

/// Typed records extracted from one assistant reply.
#[derive(Debug, Clone, Default)]
pub struct ParsedReply {
    /// Observations in reply order.
    pub observations: Vec<ObservationDraft>,
    /// At most one summary; the first well-formed block wins.
    pub summary: Option<SummaryDraft>,
}

impl ParsedReply {
    /// True when the reply carried no records at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty() && self.summary.is_none()
    }
}

/// Extract observation and summary records from reply text.
pub fn parse_reply_text(text: &str) -> ParsedReply {
    let mut parsed = ParsedReply::default();

    for capture in OBSERVATION_BLOCK.captures_iter(text) {
        let body = capture.get(1).map_or("", |m| m.as_str()).trim();
        match serde_json::from_str::<ObservationDraft>(body) {
            Ok(draft) => parsed.observations.push(draft),
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed observation block");
            },
        }
    }

    for capture in SUMMARY_BLOCK.captures_iter(text) {
        let body = capture.get(1).map_or("", |m| m.as_str()).trim();
        match serde_json::from_str::<SummaryDraft>(body) {
            Ok(draft) => {
                parsed.summary = Some(draft);
                break;
            },
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed summary block");
            },
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_yields_nothing() {
        let parsed = parse_reply_text("I looked at the file and it seems fine.");
        assert!(parsed.is_empty());
    }

    #[test]
    fn observations_parse_in_order() {
        let text = r#"Noting two things.
<observation>{"type":"discovery","title":"first","facts":["a"]}</observation>
some interleaved prose
<observation>{"type":"bugfix","title":"second"}</observation>"#;
        let parsed = parse_reply_text(text);
        assert_eq!(parsed.observations.len(), 2);
        assert_eq!(parsed.observations[0].title, "first");
        assert_eq!(parsed.observations[0].observation_type, "discovery");
        assert_eq!(parsed.observations[1].title, "second");
        assert!(parsed.summary.is_none());
    }

    #[test]
    fn malformed_blocks_are_skipped_silently() {
        let text = r#"<observation>{"title": broken}</observation>
<observation>{"title":"kept"}</observation>"#;
        let parsed = parse_reply_text(text);
        assert_eq!(parsed.observations.len(), 1);
        assert_eq!(parsed.observations[0].title, "kept");
    }

    #[test]
    fn summary_block_parses_alongside_observations() {
        let text = r#"<observation>{"title":"one"}</observation>
<summary>{"request":"fix the bug","learned":"root cause was a race","next_steps":"add a test"}</summary>"#;
        let parsed = parse_reply_text(text);
        assert_eq!(parsed.observations.len(), 1);
        let summary = parsed.summary.unwrap();
        assert_eq!(summary.request.as_deref(), Some("fix the bug"));
        assert_eq!(summary.next_steps.as_deref(), Some("add a test"));
    }

    #[test]
    fn tags_are_case_insensitive_and_multiline() {
        let text = "<OBSERVATION>\n{\"title\":\"spread out\"}\n</OBSERVATION>";
        let parsed = parse_reply_text(text);
        assert_eq!(parsed.observations.len(), 1);
        assert_eq!(parsed.observations[0].title, "spread out");
    }

    #[test]
    fn sparse_records_fill_defaults() {
        let parsed = parse_reply_text("<observation>{}</observation>");
        assert_eq!(parsed.observations.len(), 1);
        assert!(parsed.observations[0].title.is_empty());
        assert!(parsed.observations[0].facts.is_empty());
    }
}
