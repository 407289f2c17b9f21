use anyhow::Result;
use rusqlite::params;
use std::str::FromStr as _;
use toolscribe_core::{PendingDraft, PendingKind, PendingMessage, PendingStatus};

use super::{get_conn, log_row_error, now_epoch_ms, Store};

const PENDING_COLUMNS: &str = "id, content_session_id, kind, status, tool_name, tool_input,
            tool_response, cwd, prompt_number, last_user_message, last_assistant_message,
            created_at_epoch, completed_at_epoch";

fn row_to_pending_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingMessage> {
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    Ok(PendingMessage {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        kind: PendingKind::from_str(&kind_str).unwrap_or(PendingKind::Observation),
        status: PendingStatus::from_str(&status_str).unwrap_or(PendingStatus::Pending),
        tool_name: row.get(4)?,
        tool_input: row.get(5)?,
        tool_response: row.get(6)?,
        cwd: row.get(7)?,
        prompt_number: row.get(8)?,
        last_user_message: row.get(9)?,
        last_assistant_message: row.get(10)?,
        created_at_epoch: row.get(11)?,
        completed_at_epoch: row.get(12)?,
    })
}

impl Store {
    /// Durably enqueue one analyzer input for a session. Returns the new
    /// message id; ids order delivery within the session.
    ///
    /// # Errors
    /// Returns error if the insert fails.
    pub fn enqueue_message(&self, content_session_id: &str, draft: &PendingDraft) -> Result<i64> {
        let conn = get_conn(&self.pool)?;
        let now = now_epoch_ms();
        conn.execute(
            "INSERT INTO pending_messages
               (content_session_id, kind, status, tool_name, tool_input, tool_response, cwd,
                prompt_number, last_user_message, last_assistant_message, created_at_epoch)
               VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                content_session_id,
                draft.kind.as_str(),
                draft.tool_name,
                draft.tool_input,
                draft.tool_response,
                draft.cwd,
                draft.prompt_number,
                draft.last_user_message,
                draft.last_assistant_message,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Pending messages for one session with id greater than `after_id`, in
    /// insertion order. Restarted orchestrators pass 0 and see everything a
    /// crashed predecessor never marked processed.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn pending_for_session(
        &self,
        content_session_id: &str,
        after_id: i64,
    ) -> Result<Vec<PendingMessage>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {PENDING_COLUMNS} FROM pending_messages
               WHERE content_session_id = ?1 AND status = 'pending' AND id > ?2
               ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params![content_session_id, after_id], row_to_pending_message)?
            .filter_map(log_row_error)
            .collect();
        Ok(results)
    }

    /// Mark a batch of messages processed.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub fn mark_processed(&self, ids: &[i64]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = get_conn(&self.pool)?;
        let now = now_epoch_ms();
        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "UPDATE pending_messages SET status = 'processed', completed_at_epoch = ?1
               WHERE id IN ({placeholders})"
        );
        let mut values: Vec<&dyn rusqlite::ToSql> = Vec::with_capacity(ids.len() + 1);
        values.push(&now);
        for id in ids {
            values.push(id);
        }
        conn.execute(&sql, values.as_slice())?;
        Ok(())
    }

    /// Delete processed messages beyond the most recent `keep_last`,
    /// store-wide. Returns the number of rows deleted.
    ///
    /// # Errors
    /// Returns error if the delete fails.
    pub fn cleanup_processed(&self, keep_last: usize) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let deleted = conn.execute(
            "DELETE FROM pending_messages
               WHERE status = 'processed' AND id NOT IN (
                   SELECT id FROM pending_messages
                   WHERE status = 'processed'
                   ORDER BY id DESC
                   LIMIT ?1
               )",
            params![keep_last],
        )?;
        Ok(deleted)
    }

    /// Count of pending messages across all sessions.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn pending_count(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_messages WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Count of pending messages for one session.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn pending_count_for_session(&self, content_session_id: &str) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pending_messages
               WHERE content_session_id = ?1 AND status = 'pending'",
            params![content_session_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Most recent messages in any state, newest first (viewer display).
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn recent_messages(&self, limit: usize) -> Result<Vec<PendingMessage>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {PENDING_COLUMNS} FROM pending_messages ORDER BY id DESC LIMIT ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params![limit], row_to_pending_message)?
            .filter_map(log_row_error)
            .collect();
        Ok(results)
    }
}
