//! SQLite store implementation, one module per entity.

mod observations;
mod pending;
mod prompts;
mod sessions;
mod summaries;
mod token_rows;

use std::path::Path;

use anyhow::Result;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::migrations;

pub use token_rows::{ObservationCost, TokenStatRow};

/// Type alias for pooled connection
pub(crate) type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Main store struct wrapping a SQLite connection pool.
///
/// All methods are synchronous; async callers cross over with
/// `tokio::task::spawn_blocking`.
#[derive(Clone, Debug)]
pub struct Store {
    pub(crate) pool: Pool<SqliteConnectionManager>,
}

/// Get a connection from the pool
pub(crate) fn get_conn(pool: &Pool<SqliteConnectionManager>) -> Result<PooledConn> {
    pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {e}"))
}

/// Log row read errors and filter them out
pub(crate) fn log_row_error<T>(result: rusqlite::Result<T>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!("Row read error: {}", e);
            None
        },
    }
}

/// Parse a JSON-array column, tolerating rows written before the column
/// defaulted to `[]`.
pub(crate) fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Current wall-clock time, epoch milliseconds.
pub(crate) fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn init_connection(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "PRAGMA busy_timeout = 30000;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;
    Ok(())
}

fn db_pool_size() -> u32 {
    toolscribe_core::env_parse_with_default("TOOLSCRIBE_DB_POOL_SIZE", 8)
}

impl Store {
    /// Create a new store instance with a SQLite connection pool.
    ///
    /// # Errors
    /// Returns error if the pool cannot be built or migrations fail.
    pub fn new(db_path: &Path) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(init_connection);

        let pool_size = db_pool_size();
        let pool = Pool::builder().max_size(pool_size).build(manager)?;

        let conn = pool.get()?;
        migrations::run_migrations(&conn)?;
        drop(conn);

        tracing::info!(pool_size = pool_size, "Store initialized with connection pool");

        Ok(Self { pool })
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    /// Returns error if the pool cannot be built or migrations fail.
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(init_connection);
        let pool = Pool::builder().max_size(1).build(manager)?;
        let conn = pool.get()?;
        migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }
}
