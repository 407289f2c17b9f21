//! SSE live event stream.
//!
//! Subscribers join with an `initial_load` snapshot assembled here, then
//! receive broadcast events. A lagged subscriber silently skips dropped
//! events; the stream degrades to silence on disconnect.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use tokio::task::spawn_blocking;
use toolscribe_core::{LiveEvent, DEFAULT_QUERY_LIMIT};

use crate::AppState;

const SNAPSHOT_OBSERVATIONS: usize = 50;

async fn initial_snapshot(state: &AppState) -> anyhow::Result<LiveEvent> {
    let store = Arc::clone(&state.store);
    let (observations, summaries, prompts, queue) =
        spawn_blocking(move || -> anyhow::Result<_> {
            Ok((
                store.observations_page(None, None, SNAPSHOT_OBSERVATIONS)?,
                store.summaries_page(None, None, DEFAULT_QUERY_LIMIT)?,
                store.prompts_page(None, None, DEFAULT_QUERY_LIMIT)?,
                store.recent_messages(DEFAULT_QUERY_LIMIT)?,
            ))
        })
        .await??;

    let queue_depth = state.manager.total_active_work().await.unwrap_or(0);
    let is_processing = state.manager.is_any_processing().await.unwrap_or(false);

    Ok(LiveEvent::InitialLoad {
        observations,
        summaries,
        prompts,
        queue,
        is_processing,
        queue_depth: queue_depth as u64,
    })
}

pub async fn sse_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.broadcaster.subscribe();
    let snapshot = initial_snapshot(&state).await;

    let stream = async_stream::stream! {
        match snapshot {
            Ok(event) => {
                if let Ok(json) = serde_json::to_string(&event) {
                    yield Ok(Event::default().data(json));
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "initial snapshot failed, streaming live only");
            },
        }
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match serde_json::to_string(&event) {
                        Ok(json) => yield Ok(Event::default().data(json)),
                        Err(e) => tracing::warn!(error = %e, "failed to encode live event"),
                    }
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("SSE client lagged by {} events", n);
                    continue;
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}
