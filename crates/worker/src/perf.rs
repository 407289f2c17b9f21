//! In-memory performance tracking.
//!
//! Two bounded ring buffers: queue-depth samples and per-reply processing
//! records. Everything here is O(1) on the hot path; percentile math runs
//! only when a viewer asks.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use toolscribe_core::{PROCESSING_SAMPLE_CAP, QUEUE_SAMPLE_CAP, QUEUE_SAMPLE_INTERVAL_SECS};

/// Capability for recording processing metrics, injected into the
/// orchestrator.
pub trait MetricsSink: Send + Sync {
    /// Record one analyzer-reply processing sample.
    fn record_processing(&self, sample: ProcessingSample);
    /// Record the current queue depth (rate-limited internally).
    fn record_queue_depth(&self, depth: usize);
}

/// One analyzer-reply processing record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSample {
    /// Completion time, epoch milliseconds.
    pub timestamp_epoch_ms: i64,
    /// Wall-clock from reply wait start to processing done.
    pub duration_ms: u64,
    /// Observations persisted from the reply.
    pub observation_count: usize,
    /// Discovery tokens attributed to the reply.
    pub discovery_tokens: u64,
}

/// One queue-depth sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSample {
    /// Sample time, epoch milliseconds.
    pub timestamp_epoch_ms: i64,
    /// Pending + in-flight message count at sample time.
    pub depth: usize,
}

/// `/api/performance/times` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingTimes {
    pub samples: Vec<ProcessingSample>,
    pub avg_duration_ms: f64,
    pub p50_duration_ms: u64,
    pub p95_duration_ms: u64,
    pub observations_per_minute: f64,
    pub avg_queue_depth: f64,
    pub peak_queue_depth: usize,
}

/// `/api/performance/queue` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueHistory {
    pub samples: Vec<QueueSample>,
    pub avg_queue_depth: f64,
    pub peak_queue_depth: usize,
}

/// Ring-buffer metrics tracker.
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    queue_samples: Mutex<VecDeque<QueueSample>>,
    processing: Mutex<VecDeque<ProcessingSample>>,
    last_queue_sample: Mutex<Option<Instant>>,
}

/// Nearest-rank percentile over an ascending-sorted slice:
/// `index = ceil(p/100 * n) - 1`.
fn nearest_rank(sorted: &[u64], percentile: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (percentile * sorted.len()).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}

impl PerformanceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Processing stats over samples at or after `since` (epoch ms). The
    /// returned `samples` list is the most recent `limit`, newest first;
    /// the statistics cover the whole filtered set. Empty set yields all
    /// zeros.
    pub fn get_processing_times(&self, since: Option<i64>, limit: usize) -> ProcessingTimes {
        let filtered: Vec<ProcessingSample> = {
            let buffer = self.processing.lock().expect("processing lock poisoned");
            buffer
                .iter()
                .filter(|s| since.is_none_or(|cutoff| s.timestamp_epoch_ms >= cutoff))
                .copied()
                .collect()
        };
        if filtered.is_empty() {
            return ProcessingTimes::default();
        }

        let mut durations: Vec<u64> = filtered.iter().map(|s| s.duration_ms).collect();
        durations.sort_unstable();
        let avg_duration_ms =
            durations.iter().sum::<u64>() as f64 / durations.len() as f64;

        let total_observations: usize = filtered.iter().map(|s| s.observation_count).sum();
        let timespan_ms =
            filtered.last().map_or(0, |l| l.timestamp_epoch_ms) - filtered[0].timestamp_epoch_ms;
        let observations_per_minute = if timespan_ms > 0 {
            total_observations as f64 / (timespan_ms as f64 / 60_000.0)
        } else {
            0.0
        };

        let history = self.get_queue_history(since);

        let mut samples: Vec<ProcessingSample> =
            filtered.iter().rev().take(limit).copied().collect();
        samples.shrink_to_fit();

        ProcessingTimes {
            samples,
            avg_duration_ms,
            p50_duration_ms: nearest_rank(&durations, 50),
            p95_duration_ms: nearest_rank(&durations, 95),
            observations_per_minute,
            avg_queue_depth: history.avg_queue_depth,
            peak_queue_depth: history.peak_queue_depth,
        }
    }

    /// Queue-depth history at or after `since` (epoch ms).
    pub fn get_queue_history(&self, since: Option<i64>) -> QueueHistory {
        let samples: Vec<QueueSample> = {
            let buffer = self.queue_samples.lock().expect("queue lock poisoned");
            buffer
                .iter()
                .filter(|s| since.is_none_or(|cutoff| s.timestamp_epoch_ms >= cutoff))
                .copied()
                .collect()
        };
        if samples.is_empty() {
            return QueueHistory::default();
        }
        let avg_queue_depth =
            samples.iter().map(|s| s.depth).sum::<usize>() as f64 / samples.len() as f64;
        let peak_queue_depth = samples.iter().map(|s| s.depth).max().unwrap_or(0);
        QueueHistory { samples, avg_queue_depth, peak_queue_depth }
    }
}

impl MetricsSink for PerformanceTracker {
    fn record_processing(&self, sample: ProcessingSample) {
        let mut buffer = self.processing.lock().expect("processing lock poisoned");
        if buffer.len() == PROCESSING_SAMPLE_CAP {
            buffer.pop_front();
        }
        buffer.push_back(sample);
    }

    fn record_queue_depth(&self, depth: usize) {
        {
            let mut last = self.last_queue_sample.lock().expect("sample lock poisoned");
            let interval = Duration::from_secs(QUEUE_SAMPLE_INTERVAL_SECS);
            if last.is_some_and(|at| at.elapsed() < interval) {
                return;
            }
            *last = Some(Instant::now());
        }
        let mut buffer = self.queue_samples.lock().expect("queue lock poisoned");
        if buffer.len() == QUEUE_SAMPLE_CAP {
            buffer.pop_front();
        }
        buffer.push_back(QueueSample {
            timestamp_epoch_ms: chrono::Utc::now().timestamp_millis(),
            depth,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: i64, duration: u64, observations: usize) -> ProcessingSample {
        ProcessingSample {
            timestamp_epoch_ms: ts,
            duration_ms: duration,
            observation_count: observations,
            discovery_tokens: 10,
        }
    }

    #[test]
    fn nearest_rank_percentiles() {
        let tracker = PerformanceTracker::new();
        for (i, duration) in [10u64, 20, 30, 40, 50].into_iter().enumerate() {
            tracker.record_processing(sample(1000 + i as i64, duration, 1));
        }

        let times = tracker.get_processing_times(None, 100);
        assert!((times.avg_duration_ms - 30.0).abs() < f64::EPSILON);
        assert_eq!(times.p50_duration_ms, 30);
        assert_eq!(times.p95_duration_ms, 50);
    }

    #[test]
    fn empty_set_is_all_zeros() {
        let tracker = PerformanceTracker::new();
        let times = tracker.get_processing_times(None, 10);
        assert_eq!(times.p50_duration_ms, 0);
        assert!((times.observations_per_minute).abs() < f64::EPSILON);
        assert!(times.samples.is_empty());
    }

    #[test]
    fn since_filter_applies_before_stats() {
        let tracker = PerformanceTracker::new();
        tracker.record_processing(sample(1_000, 100, 1));
        tracker.record_processing(sample(2_000, 10, 1));
        tracker.record_processing(sample(3_000, 20, 1));

        let times = tracker.get_processing_times(Some(1_500), 100);
        assert_eq!(times.samples.len(), 2);
        assert!((times.avg_duration_ms - 15.0).abs() < f64::EPSILON);
    }

    #[test]
    fn observations_per_minute_uses_filtered_span() {
        let tracker = PerformanceTracker::new();
        // 6 observations over 60 seconds
        tracker.record_processing(sample(0, 10, 2));
        tracker.record_processing(sample(30_000, 10, 2));
        tracker.record_processing(sample(60_000, 10, 2));

        let times = tracker.get_processing_times(None, 100);
        assert!((times.observations_per_minute - 6.0).abs() < 1e-9);
    }

    #[test]
    fn processing_ring_is_bounded() {
        let tracker = PerformanceTracker::new();
        for i in 0..(PROCESSING_SAMPLE_CAP + 10) {
            tracker.record_processing(sample(i as i64, 1, 0));
        }
        let times = tracker.get_processing_times(None, usize::MAX);
        assert_eq!(times.samples.len(), PROCESSING_SAMPLE_CAP);
        // oldest entries were evicted
        assert_eq!(times.samples.last().unwrap().timestamp_epoch_ms, 10);
    }

    #[test]
    fn queue_sampling_is_rate_limited() {
        let tracker = PerformanceTracker::new();
        tracker.record_queue_depth(3);
        tracker.record_queue_depth(9);

        let history = tracker.get_queue_history(None);
        assert_eq!(history.samples.len(), 1);
        assert_eq!(history.samples[0].depth, 3);
        assert_eq!(history.peak_queue_depth, 3);
    }
}
