use anyhow::Result;
use rusqlite::params;
use std::str::FromStr as _;
use toolscribe_core::{Session, SessionStatus};

use super::{get_conn, now_epoch_ms, Store};

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let status_str: String = row.get(8)?;
    let status = SessionStatus::from_str(&status_str).unwrap_or(SessionStatus::Active);
    Ok(Session {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        agent_session_id: row.get(2)?,
        project: row.get(3)?,
        user_prompt: row.get(4)?,
        last_prompt_number: row.get(5)?,
        input_tokens: row.get::<_, i64>(6)? as u64,
        output_tokens: row.get::<_, i64>(7)? as u64,
        status,
        started_at_epoch: row.get(9)?,
    })
}

const SESSION_COLUMNS: &str = "id, content_session_id, agent_session_id, project, user_prompt,
            last_prompt_number, input_tokens, output_tokens, status, started_at_epoch";

impl Store {
    /// Create a session row for a new assistant-side session id.
    ///
    /// # Errors
    /// Returns error if the insert fails.
    pub fn create_session(
        &self,
        content_session_id: &str,
        project: &str,
        user_prompt: Option<&str>,
    ) -> Result<Session> {
        let conn = get_conn(&self.pool)?;
        let now = now_epoch_ms();
        conn.execute(
            "INSERT INTO sessions (content_session_id, project, user_prompt, started_at_epoch)
               VALUES (?1, ?2, ?3, ?4)",
            params![content_session_id, project, user_prompt, now],
        )?;
        Ok(Session {
            id: conn.last_insert_rowid(),
            content_session_id: content_session_id.to_owned(),
            agent_session_id: None,
            project: project.to_owned(),
            user_prompt: user_prompt.map(ToOwned::to_owned),
            last_prompt_number: 1,
            input_tokens: 0,
            output_tokens: 0,
            status: SessionStatus::Active,
            started_at_epoch: now,
        })
    }

    /// Most recent session row for an assistant-side session id, if any.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn find_session_by_content_id(&self, content_session_id: &str) -> Result<Option<Session>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE content_session_id = ?1
               ORDER BY id DESC LIMIT 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![content_session_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_session(row)?)),
            None => Ok(None),
        }
    }

    /// Transition a session row to `completed`.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub fn mark_session_completed(&self, id: i64) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute("UPDATE sessions SET status = 'completed' WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Persist the cumulative analyzer token counters for a session.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub fn update_session_tokens(&self, id: i64, input_tokens: u64, output_tokens: u64) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "UPDATE sessions SET input_tokens = ?1, output_tokens = ?2 WHERE id = ?3",
            params![input_tokens as i64, output_tokens as i64, id],
        )?;
        Ok(())
    }

    /// Advance the prompt counter and current prompt text. The counter never
    /// decreases; a stale caller is ignored.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub fn update_session_prompt(&self, id: i64, prompt_number: u32, user_prompt: &str) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "UPDATE sessions SET last_prompt_number = ?1, user_prompt = ?2
               WHERE id = ?3 AND last_prompt_number <= ?1",
            params![prompt_number, user_prompt, id],
        )?;
        Ok(())
    }

    /// Record the analyzer-side session id once the subprocess reports one.
    ///
    /// # Errors
    /// Returns error if the update fails.
    pub fn set_agent_session_id(&self, id: i64, agent_session_id: &str) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        conn.execute(
            "UPDATE sessions SET agent_session_id = ?1 WHERE id = ?2",
            params![agent_session_id, id],
        )?;
        Ok(())
    }

    /// Count of sessions still marked active (for stats output).
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn active_session_count(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE status = 'active'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
