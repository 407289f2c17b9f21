//! Shared constants for toolscribe.
//!
//! Centralizes limits and intervals that would otherwise be duplicated
//! across crates.

/// Maximum number of results for any query (DoS protection).
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Default number of results when limit is not specified by the caller.
pub const DEFAULT_QUERY_LIMIT: usize = 20;

/// Processed pending messages retained globally for the viewer.
pub const PROCESSED_KEEP_LAST: usize = 100;

/// Ring buffer capacity for queue-depth samples.
pub const QUEUE_SAMPLE_CAP: usize = 1000;

/// Ring buffer capacity for processing-duration records.
pub const PROCESSING_SAMPLE_CAP: usize = 500;

/// Minimum spacing between queue-depth samples, in seconds.
pub const QUEUE_SAMPLE_INTERVAL_SECS: u64 = 5;

/// Minimum spacing between live `token_update` pushes, in milliseconds.
pub const TOKEN_PUSH_INTERVAL_MS: u64 = 1000;

/// TTL for cached metric queries, in seconds.
pub const METRICS_CACHE_TTL_SECS: u64 = 30;

/// TTL for the cached endless-mode projection, in seconds.
pub const PROJECTION_CACHE_TTL_SECS: u64 = 300;

/// Default observation window for the endless-mode projection.
pub const PROJECTION_DEFAULT_COUNT: usize = 50;

/// Upper bound on analyzer spawn / external readiness checks, in seconds.
pub const SPAWN_TIMEOUT_SECS: u64 = 15;

/// Grace period for draining in-flight analyzer replies, in seconds.
pub const DRAIN_GRACE_SECS: u64 = 5;

/// Upper bound on a single aggregation query before the empty-shaped
/// record is returned instead.
pub const AGGREGATION_TIMEOUT_SECS: u64 = 10;
