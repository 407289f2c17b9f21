//! In-memory state for one active session.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::watch;
use toolscribe_analyzer::Usage;
use toolscribe_core::Session;

/// Orchestrator life states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Spawned, waiting for the first usage-bearing reply.
    Initializing,
    /// Pumping frames and replies.
    Running,
    /// Cancellation fired; consuming outstanding replies only.
    Draining,
    /// Reply stream ended cleanly.
    Completed,
    /// Cancellation acknowledged.
    Aborted,
}

/// Shared mutable state for one session, owned by the manager and visible
/// to the orchestrator's writer and reader halves.
#[derive(Debug)]
pub struct ActiveSession {
    /// Store row id.
    pub id: i64,
    /// Assistant-side session id.
    pub content_session_id: String,
    /// Project name.
    pub project: String,
    user_prompt: Mutex<String>,
    last_prompt_number: AtomicU32,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    pending_processing: Mutex<Vec<i64>>,
    state: Mutex<SessionState>,
    cancel_tx: watch::Sender<bool>,
}

impl ActiveSession {
    /// Build in-memory state from a store row.
    #[must_use]
    pub fn from_row(row: &Session) -> Self {
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        Self {
            id: row.id,
            content_session_id: row.content_session_id.clone(),
            project: row.project.clone(),
            user_prompt: Mutex::new(row.user_prompt.clone().unwrap_or_default()),
            last_prompt_number: AtomicU32::new(row.last_prompt_number),
            input_tokens: AtomicU64::new(row.input_tokens),
            output_tokens: AtomicU64::new(row.output_tokens),
            pending_processing: Mutex::new(Vec::new()),
            state: Mutex::new(SessionState::Initializing),
            cancel_tx,
        }
    }

    /// Current prompt text.
    #[must_use]
    pub fn user_prompt(&self) -> String {
        self.user_prompt.lock().expect("prompt lock poisoned").clone()
    }

    /// Replace the prompt text.
    pub fn set_user_prompt(&self, text: &str) {
        *self.user_prompt.lock().expect("prompt lock poisoned") = text.to_owned();
    }

    /// Current prompt number.
    #[must_use]
    pub fn last_prompt_number(&self) -> u32 {
        self.last_prompt_number.load(Ordering::Acquire)
    }

    /// Raise the prompt counter to `n`. Returns true when the counter moved;
    /// the counter never decreases.
    pub fn observe_prompt_number(&self, n: u32) -> bool {
        self.last_prompt_number.fetch_max(n, Ordering::AcqRel) < n
    }

    /// Apply one reply's usage to the cumulative counters and return the
    /// discovery delta. Cache reads never count as discovery.
    pub fn apply_usage(&self, usage: &Usage) -> u64 {
        let input_delta = usage.input_tokens + usage.cache_creation_input_tokens;
        self.input_tokens.fetch_add(input_delta, Ordering::AcqRel);
        self.output_tokens.fetch_add(usage.output_tokens, Ordering::AcqRel);
        input_delta + usage.output_tokens
    }

    /// Cumulative (input, output) token counters.
    #[must_use]
    pub fn token_totals(&self) -> (u64, u64) {
        (self.input_tokens.load(Ordering::Acquire), self.output_tokens.load(Ordering::Acquire))
    }

    /// Note a message as in flight to the analyzer.
    pub fn push_pending_id(&self, id: i64) {
        self.pending_processing.lock().expect("pending lock poisoned").push(id);
    }

    /// Drain the in-flight set for marking processed.
    #[must_use]
    pub fn take_pending_ids(&self) -> Vec<i64> {
        std::mem::take(&mut *self.pending_processing.lock().expect("pending lock poisoned"))
    }

    /// Number of messages currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending_processing.lock().expect("pending lock poisoned").len()
    }

    /// Current life state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// Transition the life state.
    pub fn set_state(&self, next: SessionState) {
        *self.state.lock().expect("state lock poisoned") = next;
    }

    /// Fire the cancellation handle.
    pub fn cancel(&self) {
        // send_replace updates the value even with no live receivers
        let _ = self.cancel_tx.send_replace(true);
    }

    /// True once cancellation has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// A receiver that resolves when cancellation fires.
    #[must_use]
    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolscribe_core::SessionStatus;

    fn row() -> Session {
        Session {
            id: 7,
            content_session_id: "content-7".to_owned(),
            agent_session_id: None,
            project: "proj".to_owned(),
            user_prompt: Some("start".to_owned()),
            last_prompt_number: 2,
            input_tokens: 100,
            output_tokens: 40,
            status: SessionStatus::Active,
            started_at_epoch: 0,
        }
    }

    #[test]
    fn usage_accounting_excludes_cache_reads() {
        let session = ActiveSession::from_row(&row());
        let usage = Usage {
            input_tokens: 10,
            output_tokens: 5,
            cache_creation_input_tokens: 3,
            cache_read_input_tokens: 1_000,
        };

        let discovery = session.apply_usage(&usage);
        assert_eq!(discovery, 18);
        assert_eq!(session.token_totals(), (113, 45));
    }

    #[test]
    fn prompt_counter_is_monotonic() {
        let session = ActiveSession::from_row(&row());
        assert!(session.observe_prompt_number(5));
        assert!(!session.observe_prompt_number(3));
        assert_eq!(session.last_prompt_number(), 5);
    }

    #[test]
    fn pending_ids_drain_once() {
        let session = ActiveSession::from_row(&row());
        session.push_pending_id(1);
        session.push_pending_id(2);
        assert_eq!(session.in_flight(), 2);
        assert_eq!(session.take_pending_ids(), vec![1, 2]);
        assert!(session.take_pending_ids().is_empty());
    }

    #[test]
    fn cancellation_latches() {
        let session = ActiveSession::from_row(&row());
        assert!(!session.is_cancelled());
        session.cancel();
        assert!(session.is_cancelled());
    }
}
