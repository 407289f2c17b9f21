//! Per-session subscription over the durable pending queue.
//!
//! The store half lives in `toolscribe-storage`; this wraps it with one
//! `Notify` gate per session so an orchestrator can wait for new work
//! without polling.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::Notify;
use tokio::task::spawn_blocking;
use toolscribe_core::{PendingDraft, PendingMessage};
use toolscribe_storage::Store;

#[derive(Debug, Clone)]
struct SessionGate {
    notify: Arc<Notify>,
    closed: Arc<AtomicBool>,
}

impl SessionGate {
    fn new() -> Self {
        Self { notify: Arc::new(Notify::new()), closed: Arc::new(AtomicBool::new(false)) }
    }
}

/// Durable FIFO of analyzer inputs, partitioned by session id.
#[derive(Debug)]
pub struct PendingQueue {
    store: Arc<Store>,
    gates: Mutex<HashMap<String, SessionGate>>,
}

impl PendingQueue {
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self { store, gates: Mutex::new(HashMap::new()) }
    }

    fn gate(&self, session_id: &str) -> SessionGate {
        let mut gates = self.gates.lock().expect("gate lock poisoned");
        gates.entry(session_id.to_owned()).or_insert_with(SessionGate::new).clone()
    }

    /// Durably enqueue a message and wake the session's subscriber.
    ///
    /// # Errors
    /// Returns error if the store write fails.
    pub async fn enqueue(&self, session_id: &str, draft: PendingDraft) -> Result<i64> {
        let store = Arc::clone(&self.store);
        let session = session_id.to_owned();
        let id = spawn_blocking(move || store.enqueue_message(&session, &draft)).await??;
        self.gate(session_id).notify.notify_one();
        Ok(id)
    }

    /// Open the lazy pending-message sequence for a session.
    ///
    /// Yields every `pending` row in insertion order, parking until new
    /// messages arrive. Messages a crashed orchestrator never marked
    /// processed are yielded again here.
    #[must_use]
    pub fn subscribe(&self, session_id: &str) -> MessageStream {
        let gate = {
            let mut gates = self.gates.lock().expect("gate lock poisoned");
            let gate = gates.entry(session_id.to_owned()).or_insert_with(SessionGate::new);
            gate.closed.store(false, Ordering::Release);
            gate.clone()
        };
        MessageStream {
            store: Arc::clone(&self.store),
            session_id: session_id.to_owned(),
            gate,
            cursor: 0,
            buffer: VecDeque::new(),
        }
    }

    /// Close the session's subscription; its stream terminates after
    /// draining rows it already fetched.
    pub fn close(&self, session_id: &str) {
        let gate = self.gate(session_id);
        gate.closed.store(true, Ordering::Release);
        gate.notify.notify_one();
        gate.notify.notify_waiters();
    }

    /// Pending message count across all sessions.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn depth(&self) -> Result<usize> {
        let store = Arc::clone(&self.store);
        Ok(spawn_blocking(move || store.pending_count()).await??)
    }
}

/// Lazy sequence of pending messages for one session.
#[derive(Debug)]
pub struct MessageStream {
    store: Arc<Store>,
    session_id: String,
    gate: SessionGate,
    cursor: i64,
    buffer: VecDeque<PendingMessage>,
}

impl MessageStream {
    /// Next pending message, in insertion order. Suspends until a message
    /// arrives or the subscription is closed; `None` means closed.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub async fn next(&mut self) -> Result<Option<PendingMessage>> {
        loop {
            if let Some(msg) = self.buffer.pop_front() {
                self.cursor = msg.id;
                return Ok(Some(msg));
            }

            // create the wakeup future before scanning so an enqueue that
            // lands between scan and park is never missed
            let notified = self.gate.notify.notified();

            let store = Arc::clone(&self.store);
            let session = self.session_id.clone();
            let cursor = self.cursor;
            let rows =
                spawn_blocking(move || store.pending_for_session(&session, cursor)).await??;
            if !rows.is_empty() {
                self.buffer.extend(rows);
                continue;
            }

            if self.gate.closed.load(Ordering::Acquire) {
                return Ok(None);
            }
            notified.await;
        }
    }

    /// Session this stream belongs to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use toolscribe_core::PendingKind;

    fn test_queue() -> (Arc<PendingQueue>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(Store::new(&temp_dir.path().join("queue.db")).unwrap());
        (Arc::new(PendingQueue::new(store)), temp_dir)
    }

    fn draft(tool: &str) -> PendingDraft {
        PendingDraft {
            kind: PendingKind::Observation,
            tool_name: Some(tool.to_owned()),
            ..PendingDraft::default()
        }
    }

    #[tokio::test]
    async fn stream_yields_in_insertion_order() {
        let (queue, _temp_dir) = test_queue();
        queue.enqueue("s1", draft("one")).await.unwrap();
        queue.enqueue("s1", draft("two")).await.unwrap();
        queue.enqueue("s1", draft("three")).await.unwrap();

        let mut stream = queue.subscribe("s1");
        for expected in ["one", "two", "three"] {
            let msg = stream.next().await.unwrap().unwrap();
            assert_eq!(msg.tool_name.as_deref(), Some(expected));
        }
    }

    #[tokio::test]
    async fn stream_wakes_on_late_enqueue() {
        let (queue, _temp_dir) = test_queue();
        let mut stream = queue.subscribe("s1");

        let enqueuer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            enqueuer.enqueue("s1", draft("late")).await.unwrap();
        });

        let msg = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("stream should wake without polling")
            .unwrap()
            .unwrap();
        assert_eq!(msg.tool_name.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn close_terminates_the_stream() {
        let (queue, _temp_dir) = test_queue();
        let mut stream = queue.subscribe("s1");

        let closer = Arc::clone(&queue);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            closer.close("s1");
        });

        let end = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("close should end the stream")
            .unwrap();
        assert!(end.is_none());
    }

    #[tokio::test]
    async fn fresh_subscription_redelivers_unprocessed() {
        let (queue, _temp_dir) = test_queue();
        queue.enqueue("s1", draft("one")).await.unwrap();
        queue.enqueue("s1", draft("two")).await.unwrap();

        let mut first = queue.subscribe("s1");
        let seen = first.next().await.unwrap().unwrap();
        assert_eq!(seen.tool_name.as_deref(), Some("one"));
        // crash before marking anything processed
        drop(first);

        let mut second = queue.subscribe("s1");
        let redelivered = second.next().await.unwrap().unwrap();
        assert_eq!(redelivered.tool_name.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let (queue, _temp_dir) = test_queue();
        queue.enqueue("s1", draft("mine")).await.unwrap();
        queue.enqueue("s2", draft("theirs")).await.unwrap();

        let mut stream = queue.subscribe("s1");
        let msg = stream.next().await.unwrap().unwrap();
        assert_eq!(msg.tool_name.as_deref(), Some("mine"));
        assert_eq!(queue.depth().await.unwrap(), 2);
    }
}
