use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::{Parser, Subcommand};
use toolscribe_core::DRAIN_GRACE_SECS;
use toolscribe_http::{create_router, AppState};
use toolscribe_storage::Store;
use toolscribe_worker::{
    DisabledVectorIndex, EventBroadcaster, MetricsSink, ObservationEvents, PendingQueue,
    PerformanceTracker, SessionManager, TokenMetricsEngine, VectorIndex, WorkerContext,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "toolscribe")]
#[command(about = "Background worker that distills coding-assistant tool activity", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker and viewer API.
    Serve {
        #[arg(short, long, default_value = "37733")]
        port: u16,
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,
        /// Analyzer command, overriding TOOLSCRIBE_ANALYZER_CMD.
        #[arg(long)]
        analyzer_cmd: Option<String>,
    },
    /// Print store counts as JSON.
    Stats,
}

fn get_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolscribe")
        .join("observations.db")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let db_path = get_db_path();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = Arc::new(Store::new(&db_path)?);

    match cli.command {
        Commands::Serve { port, host, analyzer_cmd } => {
            serve(store, &host, port, analyzer_cmd).await?;
        },
        Commands::Stats => {
            let stats = serde_json::json!({
                "observations": store.observation_count()?,
                "summaries": store.summary_count()?,
                "activeSessions": store.active_session_count()?,
                "pendingMessages": store.pending_count()?,
                "projects": store.distinct_project_count()?,
            });
            println!("{}", serde_json::to_string_pretty(&stats)?);
        },
    }

    Ok(())
}

async fn serve(
    store: Arc<Store>,
    host: &str,
    port: u16,
    analyzer_cmd: Option<String>,
) -> Result<()> {
    let pending_backlog = store.pending_count()?;
    if pending_backlog > 0 {
        tracing::info!(pending_backlog, "unprocessed messages await session resurrection");
    }

    let mut ctx = WorkerContext::default();
    if let Some(program) = analyzer_cmd {
        ctx.analyzer.program = program;
    }

    let queue = Arc::new(PendingQueue::new(Arc::clone(&store)));
    let broadcaster = Arc::new(EventBroadcaster::new(256));
    let events: Arc<dyn ObservationEvents> = Arc::clone(&broadcaster) as Arc<dyn ObservationEvents>;
    let tracker = Arc::new(PerformanceTracker::new());
    let metrics_sink: Arc<dyn MetricsSink> = Arc::clone(&tracker) as Arc<dyn MetricsSink>;
    let metrics = Arc::new(TokenMetricsEngine::new(Arc::clone(&store), Arc::clone(&events)));
    let vector: Arc<dyn VectorIndex> = Arc::new(DisabledVectorIndex);

    let manager = SessionManager::new(
        Arc::clone(&store),
        queue,
        events,
        metrics_sink,
        Arc::clone(&metrics),
        vector,
        ctx,
    );

    let state = Arc::new(AppState {
        store,
        manager: Arc::clone(&manager),
        metrics,
        tracker,
        broadcaster,
    });

    let router = create_router(state);
    let addr = format!("{host}:{port}");
    tracing::info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // stop feeding analyzers and give them the drain grace to exit
    manager.cancel_all();
    let deadline = Instant::now() + Duration::from_secs(DRAIN_GRACE_SECS);
    while manager.active_count() > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if manager.active_count() > 0 {
        tracing::warn!(remaining = manager.active_count(), "forcing shutdown with sessions active");
    }

    Ok(())
}
