//! Per-session event pump.
//!
//! Drives the analyzer subprocess for one session: a writer half feeds the
//! opening frame and then every queued message as it arrives; a reader half
//! consumes the reply stream, accounts tokens, persists parsed records, and
//! advances the pending queue. Cancellation stops the feed, drains in-flight
//! replies up to a grace deadline, and never loses persisted work.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context as _, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::{spawn_blocking, JoinHandle};
use toolscribe_analyzer::{
    parse_reply_line, parse_reply_text, spawn_stderr_logger, AnalyzerProcess, InputFrame, Reply,
    Usage,
};
use toolscribe_core::{
    LiveEvent, PendingKind, DRAIN_GRACE_SECS, PROCESSED_KEEP_LAST,
};
use toolscribe_storage::Store;

use crate::broadcaster::ObservationEvents;
use crate::context::WorkerContext;
use crate::metrics::TokenMetricsEngine;
use crate::perf::{MetricsSink, ProcessingSample};
use crate::queue::{MessageStream, PendingQueue};
use crate::session::{ActiveSession, SessionState};
use crate::vector::{fire_and_forget_observation, fire_and_forget_summary, VectorIndex};

/// How an orchestrator run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorOutcome {
    /// Reply stream ended cleanly; session row marked completed.
    Completed,
    /// Cancellation acknowledged; pending work stays for redelivery.
    Aborted,
}

/// One session's analyzer pump.
pub struct SessionOrchestrator {
    session: Arc<ActiveSession>,
    store: Arc<Store>,
    queue: Arc<PendingQueue>,
    events: Arc<dyn ObservationEvents>,
    metrics_sink: Arc<dyn MetricsSink>,
    token_metrics: Arc<TokenMetricsEngine>,
    vector: Arc<dyn VectorIndex>,
    ctx: WorkerContext,
}

impl SessionOrchestrator {
    #[expect(clippy::too_many_arguments, reason = "explicit capability injection")]
    #[must_use]
    pub fn new(
        session: Arc<ActiveSession>,
        store: Arc<Store>,
        queue: Arc<PendingQueue>,
        events: Arc<dyn ObservationEvents>,
        metrics_sink: Arc<dyn MetricsSink>,
        token_metrics: Arc<TokenMetricsEngine>,
        vector: Arc<dyn VectorIndex>,
        ctx: WorkerContext,
    ) -> Self {
        Self { session, store, queue, events, metrics_sink, token_metrics, vector, ctx }
    }

    /// Run the pump to completion or cancellation.
    ///
    /// A non-cancellation analyzer or store failure propagates; the session
    /// row stays un-completed and unmarked pending messages will be
    /// re-yielded to a future orchestrator.
    ///
    /// # Errors
    /// Returns error on analyzer spawn/IO failure or store write failure.
    pub async fn run(self) -> Result<OrchestratorOutcome> {
        let mut process = AnalyzerProcess::spawn(&self.ctx.analyzer).await?;
        let stdin =
            process.take_stdin().ok_or_else(|| anyhow!("analyzer stdin unavailable"))?;
        let stdout =
            process.take_stdout().ok_or_else(|| anyhow!("analyzer stdout unavailable"))?;
        if let Some(stderr) = process.take_stderr() {
            spawn_stderr_logger(stderr, process.pid());
        }

        let stream = self.queue.subscribe(&self.session.content_session_id);
        let writer = tokio::spawn(feed_analyzer(
            Arc::clone(&self.session),
            Arc::clone(&self.store),
            self.ctx.mode.clone(),
            stdin,
            stream,
        ));

        let outcome = self.consume_replies(stdout).await;

        writer.abort();
        finish_writer(writer).await;
        if matches!(outcome, Ok(OrchestratorOutcome::Aborted) | Err(_)) {
            let _ = process.kill().await;
        }
        outcome
    }

    async fn consume_replies(
        &self,
        stdout: ChildStdout,
    ) -> Result<OrchestratorOutcome> {
        let mut lines = BufReader::new(stdout).lines();
        let mut cancel_rx = self.session.cancel_receiver();
        let mut reply_start = Instant::now();

        loop {
            if self.session.is_cancelled() {
                return self.drain(lines, reply_start).await;
            }
            let next = tokio::select! {
                line = lines.next_line() => line.context("analyzer stdout read failed")?,
                _ = cancel_rx.changed() => {
                    return self.drain(lines, reply_start).await;
                },
            };
            match next {
                Some(line) => {
                    if let Some(Reply::Assistant { text, usage, session_id }) =
                        parse_reply_line(&line)
                    {
                        self.handle_assistant_reply(&text, &usage, session_id, reply_start)
                            .await?;
                        reply_start = Instant::now();
                    }
                },
                None => {
                    // clean end of the reply stream
                    self.session.set_state(SessionState::Completed);
                    let store = Arc::clone(&self.store);
                    let id = self.session.id;
                    spawn_blocking(move || store.mark_session_completed(id)).await??;
                    return Ok(OrchestratorOutcome::Completed);
                },
            }
        }
    }

    /// Consume outstanding replies after cancellation, up to the grace
    /// deadline. Replies that arrive in time are fully persisted.
    async fn drain(
        &self,
        mut lines: Lines<BufReader<ChildStdout>>,
        mut reply_start: Instant,
    ) -> Result<OrchestratorOutcome> {
        self.session.set_state(SessionState::Draining);
        let deadline = Instant::now() + Duration::from_secs(DRAIN_GRACE_SECS);

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    if let Some(Reply::Assistant { text, usage, session_id }) =
                        parse_reply_line(&line)
                    {
                        self.handle_assistant_reply(&text, &usage, session_id, reply_start)
                            .await?;
                        reply_start = Instant::now();
                    }
                },
                Ok(Ok(None)) | Ok(Err(_)) | Err(_) => break,
            }
        }

        self.session.set_state(SessionState::Aborted);
        tracing::info!(
            session = %self.session.content_session_id,
            "orchestrator drained after cancellation"
        );
        Ok(OrchestratorOutcome::Aborted)
    }

    /// Token accounting plus per-reply steps. Empty replies and replies
    /// that parse to nothing still advance the pending queue.
    async fn handle_assistant_reply(
        &self,
        text: &str,
        usage: &Usage,
        agent_session_id: Option<String>,
        reply_start: Instant,
    ) -> Result<()> {
        if let Some(agent_id) = agent_session_id {
            let store = Arc::clone(&self.store);
            let id = self.session.id;
            spawn_blocking(move || store.set_agent_session_id(id, &agent_id)).await??;
        }

        let discovery_tokens = self.session.apply_usage(usage);
        let (input_tokens, output_tokens) = self.session.token_totals();
        {
            let store = Arc::clone(&self.store);
            let id = self.session.id;
            spawn_blocking(move || store.update_session_tokens(id, input_tokens, output_tokens))
                .await??;
        }
        if self.session.state() == SessionState::Initializing {
            self.session.set_state(SessionState::Running);
        }

        if !text.trim().is_empty() {
            let parsed = parse_reply_text(text);
            let parsed_anything = !parsed.is_empty();
            let observation_count = parsed.observations.len();
            let prompt_number = Some(self.session.last_prompt_number());

            for draft in parsed.observations {
                let store = Arc::clone(&self.store);
                let session_id = self.session.content_session_id.clone();
                let project = self.session.project.clone();
                let observation = spawn_blocking(move || {
                    store.insert_observation(&session_id, &project, &draft, prompt_number, discovery_tokens)
                })
                .await?
                .context("observation insert failed")?;

                fire_and_forget_observation(Arc::clone(&self.vector), observation.clone());
                self.events.emit(LiveEvent::NewObservation { observation });
                self.token_metrics.invalidate_cache(Some(&self.session.project));
                self.token_metrics.broadcast_token_update().await;
            }

            if let Some(draft) = parsed.summary {
                let store = Arc::clone(&self.store);
                let session_id = self.session.content_session_id.clone();
                let project = self.session.project.clone();
                let summary = spawn_blocking(move || {
                    store.insert_summary(&session_id, &project, &draft, prompt_number, discovery_tokens)
                })
                .await?
                .context("summary insert failed")?;

                fire_and_forget_summary(Arc::clone(&self.vector), summary.clone());
                self.events.emit(LiveEvent::NewSummary { summary });
            }

            if parsed_anything {
                self.metrics_sink.record_processing(ProcessingSample {
                    timestamp_epoch_ms: chrono::Utc::now().timestamp_millis(),
                    duration_ms: reply_start.elapsed().as_millis() as u64,
                    observation_count,
                    discovery_tokens,
                });
            }
        }

        // advance the queue only after everything above persisted
        let processed_ids = self.session.take_pending_ids();
        if !processed_ids.is_empty() {
            let store = Arc::clone(&self.store);
            let ids = processed_ids.clone();
            spawn_blocking(move || -> anyhow::Result<()> {
                store.mark_processed(&ids)?;
                store.cleanup_processed(PROCESSED_KEEP_LAST)?;
                Ok(())
            })
            .await??;
        }

        let queue_depth = self.queue.depth().await.unwrap_or(0);
        self.metrics_sink.record_queue_depth(queue_depth);
        self.events.emit(LiveEvent::ProcessingStatus {
            is_processing: queue_depth > 0 || self.session.in_flight() > 0,
            queue_depth: queue_depth as u64,
        });
        Ok(())
    }
}

/// Writer half: one opening frame, then queued messages as they arrive.
/// Ends when the subscription closes; dropping stdin lets the analyzer
/// finish and exit.
async fn feed_analyzer(
    session: Arc<ActiveSession>,
    store: Arc<Store>,
    mode: String,
    mut stdin: ChildStdin,
    mut stream: MessageStream,
) -> Result<()> {
    let mut cancel_rx = session.cancel_receiver();

    let opening = opening_frame(&session, &mode);
    write_frame(&mut stdin, &opening).await?;

    loop {
        let next = tokio::select! {
            msg = stream.next() => msg?,
            _ = cancel_rx.changed() => break,
        };
        let Some(msg) = next else { break };

        // raise the prompt counter before the frame is yielded
        if msg.kind == PendingKind::Observation {
            if let Some(prompt_number) = msg.prompt_number {
                if session.observe_prompt_number(prompt_number) {
                    let store = Arc::clone(&store);
                    let id = session.id;
                    let text = session.user_prompt();
                    spawn_blocking(move || store.update_session_prompt(id, prompt_number, &text))
                        .await??;
                }
            }
        }

        session.push_pending_id(msg.id);
        let frame = InputFrame::from_pending(&msg);
        write_frame(&mut stdin, &frame).await?;
    }
    Ok(())
}

fn opening_frame(session: &ActiveSession, mode: &str) -> InputFrame {
    let prompt_number = session.last_prompt_number();
    if prompt_number > 1 {
        InputFrame::Continuation {
            project: session.project.clone(),
            session_id: session.content_session_id.clone(),
            user_prompt: session.user_prompt(),
            prompt_number,
            mode: mode.to_owned(),
        }
    } else {
        InputFrame::Init {
            project: session.project.clone(),
            session_id: session.content_session_id.clone(),
            user_prompt: session.user_prompt(),
            mode: mode.to_owned(),
        }
    }
}

async fn write_frame(stdin: &mut ChildStdin, frame: &InputFrame) -> Result<()> {
    let line = frame.to_line()?;
    stdin.write_all(line.as_bytes()).await.context("analyzer stdin write failed")?;
    stdin.write_all(b"\n").await.context("analyzer stdin write failed")?;
    stdin.flush().await.context("analyzer stdin flush failed")?;
    Ok(())
}

async fn finish_writer(writer: JoinHandle<Result<()>>) {
    match writer.await {
        Ok(Ok(())) | Err(_) => {},
        Ok(Err(e)) => tracing::debug!(error = %e, "analyzer writer ended with error"),
    }
}
