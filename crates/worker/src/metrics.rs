//! Token metrics engine.
//!
//! Read-mostly aggregation layer over the observation store: summary totals,
//! per-project and per-type breakdowns, time series, compression stats, and
//! the endless-mode projection. Results are cached with a TTL and the live
//! `token_update` push is throttled to once per second.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration as ChronoDuration, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::spawn_blocking;
use toolscribe_core::{
    LiveEvent, TokenSummary, AGGREGATION_TIMEOUT_SECS, METRICS_CACHE_TTL_SECS,
    PROJECTION_CACHE_TTL_SECS, TOKEN_PUSH_INTERVAL_MS,
};
use toolscribe_storage::{Store, TokenStatRow};

use crate::broadcaster::ObservationEvents;

#[expect(clippy::unwrap_used, reason = "static regex pattern is compile-time validated")]
static RELATIVE_SINCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(h|d|w)$").unwrap());

/// Parse a `since` filter: `"24h"` / `"7d"` / `"2w"` relative forms or an
/// ISO timestamp. Anything else means no lower bound.
#[must_use]
pub fn parse_since(since: Option<&str>) -> Option<i64> {
    let raw = since?.trim();
    if let Some(caps) = RELATIVE_SINCE.captures(raw) {
        let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
        let delta = match caps.get(2)?.as_str() {
            "h" => ChronoDuration::hours(amount),
            "d" => ChronoDuration::days(amount),
            _ => ChronoDuration::weeks(amount),
        };
        return Some((Utc::now() - delta).timestamp_millis());
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Time-series bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeGranularity {
    Hour,
    Day,
    Week,
}

impl TimeGranularity {
    /// Parses the query parameter, defaulting to `Day`.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("hour") => Self::Hour,
            Some("week") => Self::Week,
            _ => Self::Day,
        }
    }
}

/// Bucket label for a timestamp: hour `YYYY-MM-DD HH:00`, day `YYYY-MM-DD`,
/// week the Monday of that ISO week.
pub(crate) fn bucket_label(granularity: TimeGranularity, epoch_ms: i64) -> String {
    let dt = Utc.timestamp_millis_opt(epoch_ms).single().unwrap_or_default();
    match granularity {
        TimeGranularity::Hour => dt.format("%Y-%m-%d %H:00").to_string(),
        TimeGranularity::Day => dt.format("%Y-%m-%d").to_string(),
        TimeGranularity::Week => {
            let monday = dt.date_naive()
                - ChronoDuration::days(i64::from(dt.weekday().num_days_from_monday()));
            monday.format("%Y-%m-%d").to_string()
        },
    }
}

/// One project's token economics row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTokens {
    pub project: String,
    pub observations: u64,
    pub discovery_tokens: u64,
    pub read_tokens: u64,
    pub savings: i64,
    pub savings_percent: i64,
    pub efficiency_gain: f64,
}

/// `/api/tokens/by-project` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectBreakdown {
    pub projects: Vec<ProjectTokens>,
    pub total_projects: usize,
}

/// One observation-type token economics row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeTokens {
    #[serde(rename = "type")]
    pub observation_type: String,
    pub observations: u64,
    pub discovery_tokens: u64,
    pub read_tokens: u64,
    pub savings: i64,
    pub savings_percent: i64,
    pub efficiency_gain: f64,
}

/// `/api/tokens/by-type` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeBreakdown {
    pub types: Vec<TypeTokens>,
}

/// One time-series bucket with running cumulatives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBucket {
    pub bucket: String,
    pub observations: u64,
    pub discovery_tokens: u64,
    pub read_tokens: u64,
    pub cumulative_discovery_tokens: u64,
    pub cumulative_read_tokens: u64,
}

/// `/api/tokens/time-series` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesStats {
    pub granularity: String,
    pub buckets: Vec<TimeBucket>,
}

/// Per-type compression row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeCompression {
    #[serde(rename = "type")]
    pub observation_type: String,
    pub avg_compression_ratio: f64,
    pub original_tokens: u64,
    pub compressed_tokens: u64,
}

/// `/api/tokens/compression` record. Original output size is approximated
/// as twice its discovery cost.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionStats {
    pub avg_compression_ratio: f64,
    pub total_original: u64,
    pub total_compressed: u64,
    pub by_type: Vec<TypeCompression>,
}

/// `/api/tokens/projection` record: cumulative context cost with and
/// without compressed observations over the most recent window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndlessProjection {
    pub observation_count: usize,
    pub total_tokens_without: u64,
    pub total_tokens_endless: u64,
    pub tokens_saved: i64,
    pub percent_saved: f64,
    pub efficiency_gain: f64,
}

#[derive(Debug, Clone)]
enum CachedValue {
    Summary(TokenSummary),
    Projects(ProjectBreakdown),
    Types(TypeBreakdown),
    Series(TimeSeriesStats),
    Compression(CompressionStats),
    Projection(EndlessProjection),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    expires_at: Instant,
    value: CachedValue,
}

/// SQL-backed token aggregations with a TTL cache and throttled live push.
pub struct TokenMetricsEngine {
    store: Arc<Store>,
    events: Arc<dyn ObservationEvents>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    last_push: Mutex<Option<Instant>>,
}

fn cache_key(kind: &str, project: Option<&str>, extra: &str) -> String {
    format!("{kind}:{}:{extra}", project.unwrap_or(""))
}

fn project_tokens(project: String, observations: u64, read: u64, discovery: u64) -> ProjectTokens {
    let derived = TokenSummary::from_totals(observations, read, discovery);
    ProjectTokens {
        project,
        observations,
        discovery_tokens: discovery,
        read_tokens: read,
        savings: derived.savings,
        savings_percent: derived.savings_percent,
        efficiency_gain: derived.efficiency_gain,
    }
}

fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if original == 0 {
        0.0
    } else {
        ((1.0 - compressed as f64 / original as f64) * 100.0).round() / 100.0
    }
}

/// Fold (observations, read, discovery) totals per group key.
fn fold_totals<'a>(
    rows: &'a [TokenStatRow],
    key: impl Fn(&'a TokenStatRow) -> &'a str,
) -> HashMap<String, (u64, u64, u64)> {
    let mut groups: HashMap<String, (u64, u64, u64)> = HashMap::new();
    for row in rows {
        let entry = groups.entry(key(row).to_owned()).or_default();
        entry.0 += 1;
        entry.1 += row.read_tokens;
        entry.2 += row.discovery_tokens;
    }
    groups
}

impl TokenMetricsEngine {
    #[must_use]
    pub fn new(store: Arc<Store>, events: Arc<dyn ObservationEvents>) -> Self {
        Self {
            store,
            events,
            cache: Mutex::new(HashMap::new()),
            last_push: Mutex::new(None),
        }
    }

    fn cache_get(&self, key: &str) -> Option<CachedValue> {
        let cache = self.cache.lock().expect("metrics cache lock poisoned");
        cache
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    fn cache_put(&self, key: String, value: CachedValue, ttl: Duration) {
        let mut cache = self.cache.lock().expect("metrics cache lock poisoned");
        cache.insert(key, CacheEntry { expires_at: Instant::now() + ttl, value });
    }

    /// Drop cached entries that reference `project`, including filterless
    /// aggregates. Without a project, all `summary:*` keys go.
    pub fn invalidate_cache(&self, project: Option<&str>) {
        let mut cache = self.cache.lock().expect("metrics cache lock poisoned");
        match project {
            Some(p) => cache.retain(|key, _| {
                let group = key.splitn(3, ':').nth(1).unwrap_or("");
                group != p && !group.is_empty()
            }),
            None => cache.retain(|key, _| !key.starts_with("summary:")),
        }
    }

    async fn stat_rows(
        &self,
        project: Option<&str>,
        since_ms: Option<i64>,
    ) -> Result<Vec<TokenStatRow>> {
        let store = Arc::clone(&self.store);
        let project = project.map(ToOwned::to_owned);
        Ok(spawn_blocking(move || store.token_stat_rows(project.as_deref(), since_ms)).await??)
    }

    /// Uncached fast path for the live push: whole-store totals only.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn quick_summary(&self) -> Result<TokenSummary> {
        let rows = self.stat_rows(None, None).await?;
        let read: u64 = rows.iter().map(|r| r.read_tokens).sum();
        let discovery: u64 = rows.iter().map(|r| r.discovery_tokens).sum();
        Ok(TokenSummary::from_totals(rows.len() as u64, read, discovery))
    }

    /// Totals and derived ratios. Cached for 30 s; an aggregation timeout
    /// yields the zero-valued record.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn summary(&self, project: Option<&str>, since: Option<&str>) -> Result<TokenSummary> {
        let key = cache_key("summary", project, since.unwrap_or(""));
        if let Some(CachedValue::Summary(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }
        let since_ms = parse_since(since);
        let computed = match tokio::time::timeout(
            Duration::from_secs(AGGREGATION_TIMEOUT_SECS),
            self.stat_rows(project, since_ms),
        )
        .await
        {
            Ok(rows) => {
                let rows = rows?;
                let read: u64 = rows.iter().map(|r| r.read_tokens).sum();
                let discovery: u64 = rows.iter().map(|r| r.discovery_tokens).sum();
                TokenSummary::from_totals(rows.len() as u64, read, discovery)
            },
            Err(_elapsed) => {
                tracing::warn!("summary aggregation timed out, returning empty record");
                return Ok(TokenSummary::default());
            },
        };
        self.cache_put(key, CachedValue::Summary(computed), Duration::from_secs(METRICS_CACHE_TTL_SECS));
        Ok(computed)
    }

    /// Top projects by discovery tokens, with per-row savings math and the
    /// distinct-project count.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn by_project(
        &self,
        limit: usize,
        since: Option<&str>,
    ) -> Result<ProjectBreakdown> {
        let key = cache_key("by_project", None, &format!("{limit}:{}", since.unwrap_or("")));
        if let Some(CachedValue::Projects(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }
        let since_ms = parse_since(since);
        let rows = match tokio::time::timeout(
            Duration::from_secs(AGGREGATION_TIMEOUT_SECS),
            self.stat_rows(None, since_ms),
        )
        .await
        {
            Ok(rows) => rows?,
            Err(_elapsed) => {
                tracing::warn!("by-project aggregation timed out, returning empty record");
                return Ok(ProjectBreakdown::default());
            },
        };

        let groups = fold_totals(&rows, |row| row.project.as_str());
        let total_projects = groups.len();
        let mut projects: Vec<ProjectTokens> = groups
            .into_iter()
            .map(|(project, (count, read, discovery))| {
                project_tokens(project, count, read, discovery)
            })
            .collect();
        projects.sort_by(|a, b| b.discovery_tokens.cmp(&a.discovery_tokens));
        projects.truncate(limit);

        let computed = ProjectBreakdown { projects, total_projects };
        self.cache_put(key, CachedValue::Projects(computed.clone()), Duration::from_secs(METRICS_CACHE_TTL_SECS));
        Ok(computed)
    }

    /// All observation types ordered by discovery tokens descending.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn by_type(
        &self,
        project: Option<&str>,
        since: Option<&str>,
    ) -> Result<TypeBreakdown> {
        let key = cache_key("by_type", project, since.unwrap_or(""));
        if let Some(CachedValue::Types(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }
        let since_ms = parse_since(since);
        let rows = match tokio::time::timeout(
            Duration::from_secs(AGGREGATION_TIMEOUT_SECS),
            self.stat_rows(project, since_ms),
        )
        .await
        {
            Ok(rows) => rows?,
            Err(_elapsed) => {
                tracing::warn!("by-type aggregation timed out, returning empty record");
                return Ok(TypeBreakdown::default());
            },
        };

        let groups = fold_totals(&rows, |row| row.observation_type.as_str());
        let mut types: Vec<TypeTokens> = groups
            .into_iter()
            .map(|(observation_type, (count, read, discovery))| {
                let derived = TokenSummary::from_totals(count, read, discovery);
                TypeTokens {
                    observation_type,
                    observations: count,
                    discovery_tokens: discovery,
                    read_tokens: read,
                    savings: derived.savings,
                    savings_percent: derived.savings_percent,
                    efficiency_gain: derived.efficiency_gain,
                }
            })
            .collect();
        types.sort_by(|a, b| b.discovery_tokens.cmp(&a.discovery_tokens));

        let computed = TypeBreakdown { types };
        self.cache_put(key, CachedValue::Types(computed.clone()), Duration::from_secs(METRICS_CACHE_TTL_SECS));
        Ok(computed)
    }

    /// Bucketed series with running cumulatives.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn time_series(
        &self,
        project: Option<&str>,
        since: Option<&str>,
        granularity: TimeGranularity,
    ) -> Result<TimeSeriesStats> {
        let key = cache_key(
            "time_series",
            project,
            &format!("{}:{:?}", since.unwrap_or(""), granularity),
        );
        if let Some(CachedValue::Series(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }
        let since_ms = parse_since(since);
        let rows = match tokio::time::timeout(
            Duration::from_secs(AGGREGATION_TIMEOUT_SECS),
            self.stat_rows(project, since_ms),
        )
        .await
        {
            Ok(rows) => rows?,
            Err(_elapsed) => {
                tracing::warn!("time-series aggregation timed out, returning empty record");
                return Ok(TimeSeriesStats::default());
            },
        };

        // rows arrive oldest first, so buckets and cumulatives build in order
        let mut buckets: Vec<TimeBucket> = Vec::new();
        let mut cumulative_discovery = 0u64;
        let mut cumulative_read = 0u64;
        for row in &rows {
            let label = bucket_label(granularity, row.created_at_epoch);
            cumulative_discovery += row.discovery_tokens;
            cumulative_read += row.read_tokens;
            match buckets.last_mut() {
                Some(last) if last.bucket == label => {
                    last.observations += 1;
                    last.discovery_tokens += row.discovery_tokens;
                    last.read_tokens += row.read_tokens;
                    last.cumulative_discovery_tokens = cumulative_discovery;
                    last.cumulative_read_tokens = cumulative_read;
                },
                _ => buckets.push(TimeBucket {
                    bucket: label,
                    observations: 1,
                    discovery_tokens: row.discovery_tokens,
                    read_tokens: row.read_tokens,
                    cumulative_discovery_tokens: cumulative_discovery,
                    cumulative_read_tokens: cumulative_read,
                }),
            }
        }

        let granularity_label = match granularity {
            TimeGranularity::Hour => "hour",
            TimeGranularity::Day => "day",
            TimeGranularity::Week => "week",
        };
        let computed = TimeSeriesStats { granularity: granularity_label.to_owned(), buckets };
        self.cache_put(key, CachedValue::Series(computed.clone()), Duration::from_secs(METRICS_CACHE_TTL_SECS));
        Ok(computed)
    }

    /// Compression stats: original output approximated as 2x discovery cost.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn compression(
        &self,
        project: Option<&str>,
        since: Option<&str>,
    ) -> Result<CompressionStats> {
        let key = cache_key("compression", project, since.unwrap_or(""));
        if let Some(CachedValue::Compression(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }
        let since_ms = parse_since(since);
        let rows = match tokio::time::timeout(
            Duration::from_secs(AGGREGATION_TIMEOUT_SECS),
            self.stat_rows(project, since_ms),
        )
        .await
        {
            Ok(rows) => rows?,
            Err(_elapsed) => {
                tracing::warn!("compression aggregation timed out, returning empty record");
                return Ok(CompressionStats::default());
            },
        };

        let total_original: u64 = rows.iter().map(|r| r.discovery_tokens * 2).sum();
        let total_compressed: u64 = rows.iter().map(|r| r.read_tokens).sum();

        let groups = fold_totals(&rows, |row| row.observation_type.as_str());
        let mut by_type: Vec<TypeCompression> = groups
            .into_iter()
            .map(|(observation_type, (_count, read, discovery))| {
                let original = discovery * 2;
                TypeCompression {
                    observation_type,
                    avg_compression_ratio: compression_ratio(original, read),
                    original_tokens: original,
                    compressed_tokens: read,
                }
            })
            .collect();
        by_type.sort_by(|a, b| b.original_tokens.cmp(&a.original_tokens));

        let computed = CompressionStats {
            avg_compression_ratio: compression_ratio(total_original, total_compressed),
            total_original,
            total_compressed,
            by_type,
        };
        self.cache_put(key, CachedValue::Compression(computed.clone()), Duration::from_secs(METRICS_CACHE_TTL_SECS));
        Ok(computed)
    }

    /// Endless-mode projection over the most recent observations. Cached
    /// for 300 s.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn projection(
        &self,
        project: Option<&str>,
        observation_count: usize,
    ) -> Result<EndlessProjection> {
        let key = cache_key("projection", project, &observation_count.to_string());
        if let Some(CachedValue::Projection(cached)) = self.cache_get(&key) {
            return Ok(cached);
        }

        let store = Arc::clone(&self.store);
        let owned_project = project.map(ToOwned::to_owned);
        let costs = match tokio::time::timeout(
            Duration::from_secs(AGGREGATION_TIMEOUT_SECS),
            spawn_blocking(move || {
                store.recent_observation_costs(owned_project.as_deref(), observation_count)
            }),
        )
        .await
        {
            Ok(result) => result??,
            Err(_elapsed) => {
                tracing::warn!("projection aggregation timed out, returning empty record");
                return Ok(EndlessProjection::default());
            },
        };

        // two cumulative streams over the newest-first sequence: raw tool
        // output re-read each step vs compressed observations re-read
        let mut discovery_without = 0u64;
        let mut context_without = 0u64;
        let mut carried_without = 0u64;
        let mut discovery_endless = 0u64;
        let mut context_endless = 0u64;
        let mut carried_endless = 0u64;
        for cost in &costs {
            discovery_without += cost.discovery_tokens;
            context_without += cost.discovery_tokens * 2;
            carried_without += context_without;

            discovery_endless += cost.discovery_tokens;
            context_endless += cost.read_tokens;
            carried_endless += context_endless;
        }

        let total_without = discovery_without + carried_without;
        let total_endless = discovery_endless + carried_endless;
        let tokens_saved = total_without as i64 - total_endless as i64;
        let percent_saved = if total_without == 0 {
            0.0
        } else {
            (tokens_saved as f64 / total_without as f64 * 1000.0).round() / 10.0
        };
        let efficiency_gain = if total_endless == 0 {
            0.0
        } else {
            (total_without as f64 / total_endless as f64 * 10.0).round() / 10.0
        };

        let computed = EndlessProjection {
            observation_count: costs.len(),
            total_tokens_without: total_without,
            total_tokens_endless: total_endless,
            tokens_saved,
            percent_saved,
            efficiency_gain,
        };
        self.cache_put(key, CachedValue::Projection(computed), Duration::from_secs(PROJECTION_CACHE_TTL_SECS));
        Ok(computed)
    }

    /// Throttled live push: at most one `token_update` per second. Dropped
    /// pushes are implied by the next one.
    pub async fn broadcast_token_update(&self) {
        {
            let mut last = self.last_push.lock().expect("push lock poisoned");
            let interval = Duration::from_millis(TOKEN_PUSH_INTERVAL_MS);
            if last.is_some_and(|at| at.elapsed() < interval) {
                return;
            }
            *last = Some(Instant::now());
        }
        match self.quick_summary().await {
            Ok(tokens) => {
                self.events.emit(LiveEvent::TokenUpdate {
                    tokens,
                    timestamp: Utc::now().timestamp_millis(),
                });
            },
            Err(e) => {
                tracing::warn!(error = %e, "token update push failed");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcaster::EventBroadcaster;
    use tempfile::TempDir;
    use toolscribe_core::ObservationDraft;

    fn test_engine() -> (TokenMetricsEngine, Arc<Store>, Arc<EventBroadcaster>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(&temp_dir.path().join("metrics.db")).unwrap());
        let broadcaster = Arc::new(EventBroadcaster::new(64));
        let events: Arc<dyn ObservationEvents> = Arc::clone(&broadcaster) as Arc<dyn ObservationEvents>;
        let engine = TokenMetricsEngine::new(Arc::clone(&store), events);
        (engine, store, broadcaster, temp_dir)
    }

    fn insert(store: &Store, project: &str, obs_type: &str, title: &str, discovery: u64) {
        let draft = ObservationDraft {
            observation_type: obs_type.to_owned(),
            title: title.to_owned(),
            ..ObservationDraft::default()
        };
        store.insert_observation("sess", project, &draft, None, discovery).unwrap();
    }

    #[test]
    fn since_parsing_accepts_relative_and_iso() {
        let hour = parse_since(Some("24h")).unwrap();
        let now = Utc::now().timestamp_millis();
        assert!(now - hour >= 24 * 3600 * 1000);
        assert!(now - hour < 24 * 3600 * 1000 + 5_000);

        assert!(parse_since(Some("2w")).is_some());
        assert!(parse_since(Some("2026-01-01T00:00:00Z")).is_some());
        assert!(parse_since(Some("whenever")).is_none());
        assert!(parse_since(None).is_none());
    }

    #[test]
    fn bucket_labels_per_granularity() {
        // 2026-02-12 was a Thursday
        let thursday = Utc.with_ymd_and_hms(2026, 2, 12, 15, 30, 0).unwrap().timestamp_millis();
        assert_eq!(bucket_label(TimeGranularity::Hour, thursday), "2026-02-12 15:00");
        assert_eq!(bucket_label(TimeGranularity::Day, thursday), "2026-02-12");
        assert_eq!(bucket_label(TimeGranularity::Week, thursday), "2026-02-09");
    }

    #[tokio::test]
    async fn summary_matches_compression_scenario() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        // title "ok", everything else empty, discovery 40
        insert(&store, "proj", "discovery", "ok", 40);

        let summary = engine.summary(None, None).await.unwrap();
        assert_eq!(summary.total_observations, 1);
        assert_eq!(summary.total_read_tokens, 1);
        assert_eq!(summary.total_discovery_tokens, 40);
        assert_eq!(summary.savings, 39);
        assert_eq!(summary.savings_percent, 98);
        assert!((summary.efficiency_gain - 40.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn summary_is_cached_until_invalidated() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        insert(&store, "proj", "discovery", "one", 10);

        let first = engine.summary(None, None).await.unwrap();
        insert(&store, "proj", "discovery", "two", 10);
        let cached = engine.summary(None, None).await.unwrap();
        assert_eq!(cached.total_observations, first.total_observations);

        engine.invalidate_cache(None);
        let fresh = engine.summary(None, None).await.unwrap();
        assert_eq!(fresh.total_observations, 2);
    }

    #[tokio::test]
    async fn project_invalidate_drops_global_and_matching_keys() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        insert(&store, "alpha", "discovery", "one", 10);

        let _ = engine.summary(Some("alpha"), None).await.unwrap();
        let _ = engine.summary(Some("beta"), None).await.unwrap();
        insert(&store, "alpha", "discovery", "two", 10);
        insert(&store, "beta", "discovery", "three", 10);

        engine.invalidate_cache(Some("alpha"));
        let alpha = engine.summary(Some("alpha"), None).await.unwrap();
        assert_eq!(alpha.total_observations, 2);
        // beta's entry survived the targeted invalidation
        let beta = engine.summary(Some("beta"), None).await.unwrap();
        assert_eq!(beta.total_observations, 0);
    }

    #[tokio::test]
    async fn by_project_is_top_n_by_discovery() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        insert(&store, "small", "discovery", "a", 10);
        insert(&store, "big", "discovery", "b", 100);
        insert(&store, "mid", "discovery", "c", 50);

        let breakdown = engine.by_project(2, None).await.unwrap();
        assert_eq!(breakdown.total_projects, 3);
        assert_eq!(breakdown.projects.len(), 2);
        assert_eq!(breakdown.projects[0].project, "big");
        assert_eq!(breakdown.projects[1].project, "mid");
    }

    #[tokio::test]
    async fn by_type_orders_by_discovery() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        insert(&store, "p", "bugfix", "a", 5);
        insert(&store, "p", "discovery", "b", 50);
        insert(&store, "p", "discovery", "c", 25);

        let breakdown = engine.by_type(None, None).await.unwrap();
        assert_eq!(breakdown.types.len(), 2);
        assert_eq!(breakdown.types[0].observation_type, "discovery");
        assert_eq!(breakdown.types[0].observations, 2);
        assert_eq!(breakdown.types[0].discovery_tokens, 75);
    }

    #[tokio::test]
    async fn time_series_accumulates() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        insert(&store, "p", "discovery", "a", 10);
        insert(&store, "p", "discovery", "b", 20);

        let series = engine.time_series(None, None, TimeGranularity::Day).await.unwrap();
        assert_eq!(series.buckets.len(), 1);
        let bucket = &series.buckets[0];
        assert_eq!(bucket.observations, 2);
        assert_eq!(bucket.discovery_tokens, 30);
        assert_eq!(bucket.cumulative_discovery_tokens, 30);
    }

    #[tokio::test]
    async fn compression_math() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        // read cost: 4 chars -> 1 token; original = 2 * 50 = 100
        insert(&store, "p", "discovery", "abcd", 50);

        let stats = engine.compression(None, None).await.unwrap();
        assert_eq!(stats.total_original, 100);
        assert_eq!(stats.total_compressed, 1);
        assert!((stats.avg_compression_ratio - 0.99).abs() < 1e-9);
    }

    #[tokio::test]
    async fn projection_on_empty_is_zero_and_cached() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();

        let empty = engine.projection(Some("nonesuch"), 50).await.unwrap();
        assert_eq!(empty.observation_count, 0);
        assert_eq!(empty.total_tokens_without, 0);
        assert_eq!(empty.tokens_saved, 0);
        assert!((empty.percent_saved).abs() < f64::EPSILON);

        // new rows do not show through the 300 s projection cache
        insert(&store, "nonesuch", "discovery", "late", 10);
        let cached = engine.projection(Some("nonesuch"), 50).await.unwrap();
        assert_eq!(cached.observation_count, 0);
    }

    #[tokio::test]
    async fn projection_identity_holds() {
        let (engine, store, _broadcaster, _temp_dir) = test_engine();
        insert(&store, "p", "discovery", "abcdefgh", 30);
        insert(&store, "p", "discovery", "abcd", 20);

        let projection = engine.projection(Some("p"), 50).await.unwrap();
        assert_eq!(projection.observation_count, 2);
        assert_eq!(
            projection.tokens_saved,
            projection.total_tokens_without as i64 - projection.total_tokens_endless as i64
        );
        assert!(projection.total_tokens_without > projection.total_tokens_endless);
    }

    #[tokio::test]
    async fn token_push_is_throttled_to_one_per_second() {
        let (engine, store, broadcaster, _temp_dir) = test_engine();
        insert(&store, "p", "discovery", "a", 10);
        let mut rx = broadcaster.subscribe();

        for _ in 0..5 {
            engine.broadcast_token_update().await;
        }

        let first = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("one push should arrive")
            .unwrap();
        assert_eq!(first.kind(), "token_update");

        let second = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(second.is_err(), "subsequent pushes within 1 s must be dropped");
    }
}
