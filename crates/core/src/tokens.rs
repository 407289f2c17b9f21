//! Token-economics heuristics.
//!
//! Read-token cost approximates how expensive it is to inject an
//! observation's compressed body back into context: `ceil(chars / 4)` over
//! the title, subtitle, narrative, and the concatenated elements of the
//! JSON-array fields. Discovery tokens are read verbatim from the store.

use serde::{Deserialize, Serialize};

use crate::observation::Observation;

/// Character count of a JSON-array column, joining elements without
/// separators and without counting brackets or quotes. Anything that is not
/// a JSON array falls back to the raw string length.
#[must_use]
pub fn json_array_concat_len(raw: &str) -> usize {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                serde_json::Value::String(s) => s.chars().count(),
                other => other.to_string().chars().count(),
            })
            .sum(),
        _ => raw.chars().count(),
    }
}

/// Read-token cost from raw store columns. `json_arrays` carries the
/// JSON-encoded facts, concepts, files_read, and files_modified columns.
#[must_use]
pub fn read_token_cost(title: &str, subtitle: &str, narrative: &str, json_arrays: &[&str]) -> u64 {
    let mut chars = title.chars().count() + subtitle.chars().count() + narrative.chars().count();
    for raw in json_arrays {
        chars += json_array_concat_len(raw);
    }
    (chars as u64).div_ceil(4)
}

/// Read-token cost of a parsed observation.
#[must_use]
pub fn observation_read_tokens(obs: &Observation) -> u64 {
    let mut chars = obs.title.chars().count();
    chars += obs.subtitle.as_deref().map_or(0, |s| s.chars().count());
    chars += obs.narrative.as_deref().map_or(0, |s| s.chars().count());
    for list in [&obs.facts, &obs.concepts, &obs.files_read, &obs.files_modified] {
        chars += list.iter().map(|s| s.chars().count()).sum::<usize>();
    }
    (chars as u64).div_ceil(4)
}

/// Aggregate token-economics record: the body of `/api/tokens/summary` and
/// of the live `token_update` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSummary {
    pub total_observations: u64,
    pub total_read_tokens: u64,
    pub total_discovery_tokens: u64,
    /// `discovery - read`; negative when compression lost.
    pub savings: i64,
    /// `round(savings / discovery * 100)`, 0 when discovery is 0.
    pub savings_percent: i64,
    /// `round(discovery / read * 10) / 10`, 0 when read is 0.
    pub efficiency_gain: f64,
    pub avg_read_tokens_per_obs: i64,
    pub avg_discovery_tokens_per_obs: i64,
}

impl TokenSummary {
    /// Derives the full record from the three raw totals.
    #[must_use]
    pub fn from_totals(observations: u64, read_tokens: u64, discovery_tokens: u64) -> Self {
        let savings = discovery_tokens as i64 - read_tokens as i64;
        let savings_percent = if discovery_tokens == 0 {
            0
        } else {
            (savings as f64 / discovery_tokens as f64 * 100.0).round() as i64
        };
        let efficiency_gain = if read_tokens == 0 {
            0.0
        } else {
            (discovery_tokens as f64 / read_tokens as f64 * 10.0).round() / 10.0
        };
        let avg_read_tokens_per_obs = if observations == 0 {
            0
        } else {
            (read_tokens as f64 / observations as f64).round() as i64
        };
        let avg_discovery_tokens_per_obs = if observations == 0 {
            0
        } else {
            (discovery_tokens as f64 / observations as f64).round() as i64
        };
        Self {
            total_observations: observations,
            total_read_tokens: read_tokens,
            total_discovery_tokens: discovery_tokens,
            savings,
            savings_percent,
            efficiency_gain,
            avg_read_tokens_per_obs,
            avg_discovery_tokens_per_obs,
        }
    }
}
