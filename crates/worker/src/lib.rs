//! Session orchestration layer for toolscribe
//!
//! Owns the per-session event pump that drives the analyzer subprocess, the
//! lifecycle registry, the live event broadcaster, the token metrics engine,
//! the performance tracker, and the vector index mirror.

mod broadcaster;
mod context;
mod manager;
mod metrics;
mod orchestrator;
mod perf;
mod queue;
mod session;
mod vector;

pub use broadcaster::{EventBroadcaster, ObservationEvents};
pub use context::WorkerContext;
pub use manager::SessionManager;
pub use metrics::{
    parse_since, CompressionStats, EndlessProjection, ProjectBreakdown, ProjectTokens,
    TimeBucket, TimeGranularity, TimeSeriesStats, TokenMetricsEngine, TypeBreakdown,
    TypeCompression, TypeTokens,
};
pub use orchestrator::{OrchestratorOutcome, SessionOrchestrator};
pub use perf::{
    MetricsSink, PerformanceTracker, ProcessingSample, ProcessingTimes, QueueHistory, QueueSample,
};
pub use queue::{MessageStream, PendingQueue};
pub use session::{ActiveSession, SessionState};
pub use vector::{fire_and_forget_observation, fire_and_forget_summary, DisabledVectorIndex, VectorIndex};
