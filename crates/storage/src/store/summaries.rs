use anyhow::Result;
use rusqlite::params;
use toolscribe_core::{SessionSummary, SummaryDraft};

use super::{get_conn, log_row_error, now_epoch_ms, Store};

const SUMMARY_COLUMNS: &str = "id, content_session_id, project, request, investigated, learned,
            completed, next_steps, notes, prompt_number, discovery_tokens, created_at_epoch";

fn row_to_summary(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        project: row.get(2)?,
        request: row.get(3)?,
        investigated: row.get(4)?,
        learned: row.get(5)?,
        completed: row.get(6)?,
        next_steps: row.get(7)?,
        notes: row.get(8)?,
        prompt_number: row.get(9)?,
        discovery_tokens: row.get::<_, i64>(10)? as u64,
        created_at_epoch: row.get(11)?,
    })
}

impl Store {
    /// Insert one end-of-session summary and return the stored row.
    ///
    /// # Errors
    /// Returns error if the insert fails.
    pub fn insert_summary(
        &self,
        content_session_id: &str,
        project: &str,
        draft: &SummaryDraft,
        prompt_number: Option<u32>,
        discovery_tokens: u64,
    ) -> Result<SessionSummary> {
        let conn = get_conn(&self.pool)?;
        let now = now_epoch_ms();
        conn.execute(
            "INSERT INTO session_summaries
               (content_session_id, project, request, investigated, learned, completed,
                next_steps, notes, prompt_number, discovery_tokens, created_at_epoch)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                content_session_id,
                project,
                draft.request,
                draft.investigated,
                draft.learned,
                draft.completed,
                draft.next_steps,
                draft.notes,
                prompt_number,
                discovery_tokens as i64,
                now,
            ],
        )?;
        Ok(SessionSummary {
            id: conn.last_insert_rowid(),
            content_session_id: content_session_id.to_owned(),
            project: project.to_owned(),
            request: draft.request.clone(),
            investigated: draft.investigated.clone(),
            learned: draft.learned.clone(),
            completed: draft.completed.clone(),
            next_steps: draft.next_steps.clone(),
            notes: draft.notes.clone(),
            prompt_number,
            discovery_tokens,
            created_at_epoch: now,
        })
    }

    /// Newest-first page of summaries.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn summaries_page(
        &self,
        project: Option<&str>,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SessionSummary>> {
        let conn = get_conn(&self.pool)?;
        let cursor = after_id.unwrap_or(i64::MAX);
        let results = if let Some(p) = project {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM session_summaries
                   WHERE project = ?1 AND id < ?2 ORDER BY id DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![p, cursor, limit], row_to_summary)?
                .filter_map(log_row_error)
                .collect();
            rows
        } else {
            let sql = format!(
                "SELECT {SUMMARY_COLUMNS} FROM session_summaries
                   WHERE id < ?1 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![cursor, limit], row_to_summary)?
                .filter_map(log_row_error)
                .collect();
            rows
        };
        Ok(results)
    }

    /// Total summary count (for stats output).
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn summary_count(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM session_summaries", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
