//! Per-observation token rows for the metrics engine.
//!
//! The read-token heuristic concatenates JSON-array elements, which SQLite
//! cannot evaluate server-side, so the engine streams these rows and
//! aggregates in memory.

use anyhow::Result;
use rusqlite::params;
use toolscribe_core::read_token_cost;

use super::{get_conn, log_row_error, Store};

/// One observation's token economics, as scanned for aggregation.
#[derive(Debug, Clone)]
pub struct TokenStatRow {
    pub project: String,
    pub observation_type: String,
    pub discovery_tokens: u64,
    pub read_tokens: u64,
    pub created_at_epoch: i64,
}

/// Token cost pair for the endless-mode projection.
#[derive(Debug, Clone, Copy)]
pub struct ObservationCost {
    pub discovery_tokens: u64,
    pub read_tokens: u64,
}

fn row_to_stat(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenStatRow> {
    let title: String = row.get(4)?;
    let subtitle: Option<String> = row.get(5)?;
    let narrative: Option<String> = row.get(6)?;
    let facts: String = row.get(7)?;
    let concepts: String = row.get(8)?;
    let files_read: String = row.get(9)?;
    let files_modified: String = row.get(10)?;
    let read_tokens = read_token_cost(
        &title,
        subtitle.as_deref().unwrap_or(""),
        narrative.as_deref().unwrap_or(""),
        &[&facts, &concepts, &files_read, &files_modified],
    );
    Ok(TokenStatRow {
        project: row.get(0)?,
        observation_type: row.get(1)?,
        discovery_tokens: row.get::<_, i64>(2)? as u64,
        read_tokens,
        created_at_epoch: row.get(3)?,
    })
}

const STAT_COLUMNS: &str = "project, observation_type, discovery_tokens, created_at_epoch,
            title, subtitle, narrative, facts, concepts, files_read, files_modified";

impl Store {
    /// Token rows matching the optional project/since filters, oldest first.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn token_stat_rows(
        &self,
        project: Option<&str>,
        since_epoch_ms: Option<i64>,
    ) -> Result<Vec<TokenStatRow>> {
        let conn = get_conn(&self.pool)?;
        let mut sql = format!("SELECT {STAT_COLUMNS} FROM observations");
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::new();
        if let Some(ref p) = project {
            clauses.push("project = ?");
            values.push(p);
        }
        if let Some(ref since) = since_epoch_ms {
            clauses.push("created_at_epoch >= ?");
            values.push(since);
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at_epoch");

        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(values.as_slice(), row_to_stat)?
            .filter_map(log_row_error)
            .collect();
        Ok(results)
    }

    /// The `limit` most recent observation costs, newest first, for the
    /// endless-mode projection.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn recent_observation_costs(
        &self,
        project: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ObservationCost>> {
        let rows = if let Some(p) = project {
            let conn = get_conn(&self.pool)?;
            let sql = format!(
                "SELECT {STAT_COLUMNS} FROM observations WHERE project = ?1
                   ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let collected: Vec<TokenStatRow> = stmt
                .query_map(params![p, limit], row_to_stat)?
                .filter_map(log_row_error)
                .collect();
            collected
        } else {
            let conn = get_conn(&self.pool)?;
            let sql = format!(
                "SELECT {STAT_COLUMNS} FROM observations ORDER BY id DESC LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let collected: Vec<TokenStatRow> = stmt
                .query_map(params![limit], row_to_stat)?
                .filter_map(log_row_error)
                .collect();
            collected
        };
        Ok(rows
            .into_iter()
            .map(|r| ObservationCost {
                discovery_tokens: r.discovery_tokens,
                read_tokens: r.read_tokens,
            })
            .collect())
    }

    /// Count of distinct projects with at least one observation.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn distinct_project_count(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT project) FROM observations",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
