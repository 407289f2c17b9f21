//! End-to-end orchestrator tests against a scripted fake analyzer.
//!
//! The fake is a tiny shell loop speaking the real wire protocol: it swallows
//! the opening frame and answers every later input line with one assistant
//! reply carrying a tagged observation block and a usage record.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use toolscribe_analyzer::AnalyzerConfig;
use toolscribe_core::{PendingDraft, PendingKind, SessionStatus};
use toolscribe_storage::Store;
use toolscribe_worker::{
    DisabledVectorIndex, EventBroadcaster, MetricsSink, ObservationEvents, PendingQueue,
    PerformanceTracker, SessionManager, TokenMetricsEngine, VectorIndex, WorkerContext,
};

/// Replies to every post-init line with `msg-<n>` observation blocks, then
/// echoes a result frame at EOF.
const ECHO_SCRIPT: &str = r#"
n=0
while IFS= read -r line; do
  n=$((n+1))
  if [ "$n" -gt 1 ]; then
    i=$((n-1))
    printf '%s\n' "{\"type\":\"assistant\",\"message\":{\"content\":\"<observation>{\\\"type\\\":\\\"discovery\\\",\\\"title\\\":\\\"msg-$i\\\"}</observation>\",\"usage\":{\"input_tokens\":30,\"output_tokens\":10}}}"
  fi
done
printf '%s\n' '{"type":"result"}'
"#;

/// Replies to exactly one observation, then exits so the reply stream ends
/// cleanly.
const ONE_SHOT_SCRIPT: &str = r#"
n=0
while IFS= read -r line; do
  n=$((n+1))
  if [ "$n" -gt 1 ]; then
    printf '%s\n' "{\"type\":\"assistant\",\"message\":{\"content\":\"<observation>{\\\"type\\\":\\\"discovery\\\",\\\"title\\\":\\\"only\\\"}</observation>\",\"usage\":{\"input_tokens\":8,\"output_tokens\":4}}}"
    exit 0
  fi
done
"#;

fn fake_analyzer(script: &str) -> AnalyzerConfig {
    AnalyzerConfig {
        program: "sh".to_owned(),
        args: vec!["-c".to_owned(), script.to_owned()],
        working_dir: None,
    }
}

struct Stack {
    manager: Arc<SessionManager>,
    store: Arc<Store>,
    broadcaster: Arc<EventBroadcaster>,
    _temp_dir: TempDir,
}

fn build_stack(script: &str) -> Stack {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(Store::new(&temp_dir.path().join("worker.db")).unwrap());
    let queue = Arc::new(PendingQueue::new(Arc::clone(&store)));
    let broadcaster = Arc::new(EventBroadcaster::new(256));
    let events: Arc<dyn ObservationEvents> = Arc::clone(&broadcaster) as Arc<dyn ObservationEvents>;
    let tracker = Arc::new(PerformanceTracker::new());
    let metrics_sink: Arc<dyn MetricsSink> = tracker;
    let token_metrics =
        Arc::new(TokenMetricsEngine::new(Arc::clone(&store), Arc::clone(&events)));
    let vector: Arc<dyn VectorIndex> = Arc::new(DisabledVectorIndex);
    let ctx = WorkerContext { analyzer: fake_analyzer(script), mode: "observe".to_owned() };

    let manager = SessionManager::new(
        Arc::clone(&store),
        queue,
        events,
        metrics_sink,
        token_metrics,
        vector,
        ctx,
    );
    Stack { manager, store, broadcaster, _temp_dir: temp_dir }
}

fn tool_draft(tool: &str) -> PendingDraft {
    PendingDraft {
        kind: PendingKind::Observation,
        tool_name: Some(tool.to_owned()),
        tool_input: Some(r#"{"path":"/tmp/file"}"#.to_owned()),
        tool_response: Some(r#"{"output":"contents"}"#.to_owned()),
        cwd: Some("/work".to_owned()),
        ..PendingDraft::default()
    }
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn messages_flow_through_in_order() {
    let stack = build_stack(ECHO_SCRIPT);

    let (session, created) = stack
        .manager
        .initialize_session("sess-order", "proj", Some("investigate"))
        .await
        .unwrap();
    assert!(created);

    for tool in ["m1", "m2", "m3"] {
        stack.manager.enqueue(&session, tool_draft(tool)).await.unwrap();
    }

    let store = Arc::clone(&stack.store);
    wait_until("three observations", || {
        store.session_observations("sess-order").unwrap().len() == 3
    })
    .await;

    let observations = stack.store.session_observations("sess-order").unwrap();
    let titles: Vec<_> = observations.iter().map(|o| o.title.clone()).collect();
    assert_eq!(titles, vec!["msg-1", "msg-2", "msg-3"]);
    assert!(observations.windows(2).all(|pair| pair[0].id < pair[1].id));
    // every reply attributed the full discovery delta
    assert!(observations.iter().all(|o| o.discovery_tokens == 40));

    let store = Arc::clone(&stack.store);
    wait_until("queue drained", || {
        store.pending_for_session("sess-order", 0).unwrap().is_empty()
    })
    .await;

    stack.manager.cancel_session("sess-order");
}

#[tokio::test]
async fn idempotent_initialize_keeps_one_orchestrator() {
    let stack = build_stack(ECHO_SCRIPT);

    let (first, created_first) =
        stack.manager.initialize_session("sess-idem", "proj", Some("go")).await.unwrap();
    let (second, created_second) =
        stack.manager.initialize_session("sess-idem", "proj", Some("go")).await.unwrap();

    assert!(created_first);
    assert!(!created_second);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(stack.manager.active_count(), 1);

    stack.manager.cancel_session("sess-idem");
}

#[tokio::test]
async fn clean_reply_stream_end_completes_the_session() {
    let stack = build_stack(ONE_SHOT_SCRIPT);

    let (session, _created) =
        stack.manager.initialize_session("sess-done", "proj", Some("one thing")).await.unwrap();
    stack.manager.enqueue(&session, tool_draft("only")).await.unwrap();

    let store = Arc::clone(&stack.store);
    wait_until("session completed", || {
        store
            .find_session_by_content_id("sess-done")
            .unwrap()
            .is_some_and(|s| s.status == SessionStatus::Completed)
    })
    .await;

    let manager = Arc::clone(&stack.manager);
    wait_until("registry cleared", || manager.active_count() == 0).await;

    let observations = stack.store.session_observations("sess-done").unwrap();
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].title, "only");
    // accounting matched the reply's usage record
    let row = stack.store.find_session_by_content_id("sess-done").unwrap().unwrap();
    assert_eq!(row.input_tokens, 8);
    assert_eq!(row.output_tokens, 4);
}

#[tokio::test]
async fn cancellation_preserves_persisted_work_and_redelivers_the_rest() {
    let stack = build_stack(ECHO_SCRIPT);

    let (session, _created) =
        stack.manager.initialize_session("sess-cancel", "proj", Some("start")).await.unwrap();
    stack.manager.enqueue(&session, tool_draft("m1")).await.unwrap();
    stack.manager.enqueue(&session, tool_draft("m2")).await.unwrap();

    let store = Arc::clone(&stack.store);
    wait_until("two observations persisted", || {
        store.session_observations("sess-cancel").unwrap().len() == 2
    })
    .await;

    stack.manager.cancel_session("sess-cancel");
    let manager = Arc::clone(&stack.manager);
    wait_until("orchestrator removed", || manager.active_count() == 0).await;

    // work queued while no orchestrator runs stays pending
    for tool in ["m3", "m4", "m5"] {
        stack.manager.enqueue(&session, tool_draft(tool)).await.unwrap();
    }
    assert_eq!(stack.store.session_observations("sess-cancel").unwrap().len(), 2);
    assert_eq!(stack.store.pending_for_session("sess-cancel", 0).unwrap().len(), 3);

    // resurrection drains the backlog in order
    let (_revived, created) =
        stack.manager.initialize_session("sess-cancel", "proj", None).await.unwrap();
    assert!(created);

    let store = Arc::clone(&stack.store);
    wait_until("backlog processed", || {
        store.session_observations("sess-cancel").unwrap().len() == 5
            && store.pending_for_session("sess-cancel", 0).unwrap().is_empty()
    })
    .await;

    let titles: Vec<_> = stack
        .store
        .session_observations("sess-cancel")
        .unwrap()
        .iter()
        .map(|o| o.title.clone())
        .collect();
    // first run saw two messages, the resurrected run three more, in order
    assert_eq!(titles, vec!["msg-1", "msg-2", "msg-1", "msg-2", "msg-3"]);

    stack.manager.cancel_session("sess-cancel");
}

#[tokio::test]
async fn live_events_surface_new_observations() {
    let stack = build_stack(ECHO_SCRIPT);
    let mut rx = stack.broadcaster.subscribe();

    let (session, _created) =
        stack.manager.initialize_session("sess-live", "proj", Some("watch")).await.unwrap();
    stack.manager.enqueue(&session, tool_draft("m1")).await.unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut saw_observation = false;
    let mut saw_status = false;
    while Instant::now() < deadline && !(saw_observation && saw_status) {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(event)) => match event.kind() {
                "new_observation" => saw_observation = true,
                "processing_status" => saw_status = true,
                _ => {},
            },
            _ => break,
        }
    }
    assert!(saw_observation, "expected a new_observation event");
    assert!(saw_status, "expected a processing_status event");

    stack.manager.cancel_session("sess-live");
}
