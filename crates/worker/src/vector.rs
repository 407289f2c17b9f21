//! Best-effort mirror to an external vector index.
//!
//! The index client is an external collaborator; this module defines the
//! interface and the fire-and-forget dispatch. Sync failures are logged and
//! never reach the orchestrator's critical path.

use std::sync::Arc;

use async_trait::async_trait;
use toolscribe_core::{Observation, Result, SessionSummary};

/// Interface to the external vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Mirror one observation. Ordering relative to store writes is not
    /// guaranteed.
    async fn sync_observation(&self, observation: &Observation) -> Result<()>;

    /// Mirror one session summary.
    async fn sync_summary(&self, summary: &SessionSummary) -> Result<()>;
}

/// No-op index used when no vector store is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledVectorIndex;

#[async_trait]
impl VectorIndex for DisabledVectorIndex {
    async fn sync_observation(&self, observation: &Observation) -> Result<()> {
        tracing::trace!(id = observation.id, "vector index disabled, skipping observation sync");
        Ok(())
    }

    async fn sync_summary(&self, summary: &SessionSummary) -> Result<()> {
        tracing::trace!(id = summary.id, "vector index disabled, skipping summary sync");
        Ok(())
    }
}

/// Spawn a background sync of one observation; failures log at warn.
pub fn fire_and_forget_observation(index: Arc<dyn VectorIndex>, observation: Observation) {
    tokio::spawn(async move {
        if let Err(e) = index.sync_observation(&observation).await {
            tracing::warn!(id = observation.id, error = %e, "vector sync failed for observation");
        }
    });
}

/// Spawn a background sync of one summary; failures log at warn.
pub fn fire_and_forget_summary(index: Arc<dyn VectorIndex>, summary: SessionSummary) {
    tokio::spawn(async move {
        if let Err(e) = index.sync_summary(&summary).await {
            tracing::warn!(id = summary.id, error = %e, "vector sync failed for summary");
        }
    });
}
