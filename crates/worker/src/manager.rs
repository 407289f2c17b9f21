//! Lifecycle registry of active sessions.
//!
//! One orchestrator per assistant-side session id, enforced by the registry
//! map. New inbound events for a running session append to its queue; events
//! for a finished or failed session resurrect it with the prior prompt
//! counter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::task::spawn_blocking;
use toolscribe_core::{LiveEvent, PendingDraft};
use toolscribe_storage::Store;

use crate::broadcaster::ObservationEvents;
use crate::context::WorkerContext;
use crate::metrics::TokenMetricsEngine;
use crate::orchestrator::SessionOrchestrator;
use crate::perf::MetricsSink;
use crate::queue::PendingQueue;
use crate::session::ActiveSession;
use crate::vector::VectorIndex;

type Registry = Arc<Mutex<HashMap<String, Arc<ActiveSession>>>>;

/// Process-wide registry of running session orchestrators.
pub struct SessionManager {
    store: Arc<Store>,
    queue: Arc<PendingQueue>,
    events: Arc<dyn ObservationEvents>,
    metrics_sink: Arc<dyn MetricsSink>,
    token_metrics: Arc<TokenMetricsEngine>,
    vector: Arc<dyn VectorIndex>,
    ctx: WorkerContext,
    active: Registry,
    init_lock: tokio::sync::Mutex<()>,
}

/// Drop a finished session from the registry and rebroadcast the processing
/// status. Shared between explicit deletes and orchestrator completion.
async fn remove_and_rebroadcast(
    active: &Registry,
    queue: &Arc<PendingQueue>,
    events: &Arc<dyn ObservationEvents>,
    content_session_id: &str,
) {
    let removed = active
        .lock()
        .expect("registry lock poisoned")
        .remove(content_session_id)
        .is_some();
    if removed {
        let depth = queue.depth().await.unwrap_or(0);
        events.emit(LiveEvent::ProcessingStatus {
            is_processing: depth > 0,
            queue_depth: depth as u64,
        });
    }
}

impl SessionManager {
    #[expect(clippy::too_many_arguments, reason = "explicit capability injection")]
    #[must_use]
    pub fn new(
        store: Arc<Store>,
        queue: Arc<PendingQueue>,
        events: Arc<dyn ObservationEvents>,
        metrics_sink: Arc<dyn MetricsSink>,
        token_metrics: Arc<TokenMetricsEngine>,
        vector: Arc<dyn VectorIndex>,
        ctx: WorkerContext,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            queue,
            events,
            metrics_sink,
            token_metrics,
            vector,
            ctx,
            active: Arc::new(Mutex::new(HashMap::new())),
            init_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Look up a running session.
    #[must_use]
    pub fn get(&self, content_session_id: &str) -> Option<Arc<ActiveSession>> {
        self.active.lock().expect("registry lock poisoned").get(content_session_id).cloned()
    }

    /// Idempotently ensure a session exists and its orchestrator runs.
    ///
    /// Returns the active session and whether this call started it. A store
    /// row left over from an earlier run is resurrected with its prior
    /// prompt counter.
    ///
    /// # Errors
    /// Returns error if the store cannot be read or written.
    pub async fn initialize_session(
        &self,
        content_session_id: &str,
        project: &str,
        user_prompt: Option<&str>,
    ) -> Result<(Arc<ActiveSession>, bool)> {
        if let Some(existing) = self.get(content_session_id) {
            return Ok((existing, false));
        }

        let _init_guard = self.init_lock.lock().await;
        if let Some(existing) = self.get(content_session_id) {
            return Ok((existing, false));
        }

        let store = Arc::clone(&self.store);
        let lookup_id = content_session_id.to_owned();
        let existing_row =
            spawn_blocking(move || store.find_session_by_content_id(&lookup_id)).await??;

        let (row, resurrected) = match existing_row {
            Some(row) => (row, true),
            None => {
                let store = Arc::clone(&self.store);
                let id = content_session_id.to_owned();
                let proj = project.to_owned();
                let prompt = user_prompt.map(ToOwned::to_owned);
                let row = spawn_blocking(move || {
                    store.create_session(&id, &proj, prompt.as_deref())
                })
                .await??;
                (row, false)
            },
        };

        let session = Arc::new(ActiveSession::from_row(&row));

        if let Some(prompt_text) = user_prompt {
            if resurrected {
                self.record_prompt(&session, prompt_text).await?;
            } else {
                let store = Arc::clone(&self.store);
                let id = content_session_id.to_owned();
                let proj = project.to_owned();
                let text = prompt_text.to_owned();
                let prompt =
                    spawn_blocking(move || store.insert_prompt(&id, &proj, 1, &text)).await??;
                self.events.emit(LiveEvent::NewPrompt { prompt });
            }
        }

        self.active
            .lock()
            .expect("registry lock poisoned")
            .insert(content_session_id.to_owned(), Arc::clone(&session));

        let orchestrator = SessionOrchestrator::new(
            Arc::clone(&session),
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            Arc::clone(&self.events),
            Arc::clone(&self.metrics_sink),
            Arc::clone(&self.token_metrics),
            Arc::clone(&self.vector),
            self.ctx.clone(),
        );
        let active = Arc::clone(&self.active);
        let queue = Arc::clone(&self.queue);
        let events = Arc::clone(&self.events);
        let session_key = content_session_id.to_owned();
        tokio::spawn(async move {
            match orchestrator.run().await {
                Ok(outcome) => {
                    tracing::info!(session = %session_key, ?outcome, "orchestrator finished");
                },
                Err(e) => {
                    // session row stays un-completed; pending messages will
                    // be re-yielded on resurrection
                    tracing::error!(session = %session_key, error = %e, "orchestrator failed");
                },
            }
            remove_and_rebroadcast(&active, &queue, &events, &session_key).await;
        });

        Ok((session, true))
    }

    /// Record a new user prompt on a running session: bumps the counter,
    /// persists, and emits `new_prompt`.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub async fn record_prompt(&self, session: &ActiveSession, text: &str) -> Result<()> {
        let prompt_number = session.last_prompt_number() + 1;
        session.observe_prompt_number(prompt_number);
        session.set_user_prompt(text);

        let store = Arc::clone(&self.store);
        let id = session.id;
        let content_id = session.content_session_id.clone();
        let project = session.project.clone();
        let prompt_text = text.to_owned();
        let prompt = spawn_blocking(move || -> anyhow::Result<_> {
            store.update_session_prompt(id, prompt_number, &prompt_text)?;
            store.insert_prompt(&content_id, &project, prompt_number, &prompt_text)
        })
        .await??;
        self.events.emit(LiveEvent::NewPrompt { prompt });
        Ok(())
    }

    /// Append an inbound event to the session's queue. The message is
    /// stamped with the session's current prompt number and delivered in
    /// order without restarting the analyzer.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub async fn enqueue(&self, session: &ActiveSession, mut draft: PendingDraft) -> Result<i64> {
        if draft.prompt_number.is_none() {
            draft.prompt_number = Some(session.last_prompt_number());
        }
        let id = self.queue.enqueue(&session.content_session_id, draft).await?;

        let depth = self.queue.depth().await.unwrap_or(0);
        self.metrics_sink.record_queue_depth(depth);
        self.events.emit(LiveEvent::ProcessingStatus {
            is_processing: true,
            queue_depth: depth as u64,
        });
        Ok(id)
    }

    /// Fire a session's cancellation handle and close its queue
    /// subscription. Already-persisted observations are untouched; pending
    /// messages stay for later redelivery.
    pub fn cancel_session(&self, content_session_id: &str) {
        if let Some(session) = self.get(content_session_id) {
            self.queue.close(content_session_id);
            session.cancel();
        }
    }

    /// Cancel every running session (shutdown path).
    pub fn cancel_all(&self) {
        let sessions: Vec<Arc<ActiveSession>> = {
            let map = self.active.lock().expect("registry lock poisoned");
            map.values().cloned().collect()
        };
        for session in sessions {
            self.queue.close(&session.content_session_id);
            session.cancel();
        }
    }

    /// Remove a finished session and rebroadcast the processing status.
    pub async fn delete(&self, content_session_id: &str) {
        remove_and_rebroadcast(&self.active, &self.queue, &self.events, content_session_id).await;
    }

    /// Number of running orchestrators.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().expect("registry lock poisoned").len()
    }

    /// Queued plus in-flight message count across all sessions. In-flight
    /// messages are still `pending` in the store, so the store count covers
    /// both.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn total_active_work(&self) -> Result<usize> {
        self.queue.depth().await
    }

    /// True when any session has queued or in-flight work.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub async fn is_any_processing(&self) -> Result<bool> {
        Ok(self.total_active_work().await? > 0
            || self
                .active
                .lock()
                .expect("registry lock poisoned")
                .values()
                .any(|s| s.in_flight() > 0))
    }
}
