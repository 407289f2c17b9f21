use anyhow::Result;
use rusqlite::params;
use toolscribe_core::UserPrompt;

use super::{get_conn, log_row_error, now_epoch_ms, Store};

fn row_to_prompt(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserPrompt> {
    Ok(UserPrompt {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        project: row.get(2)?,
        prompt_number: row.get(3)?,
        prompt_text: row.get(4)?,
        created_at_epoch: row.get(5)?,
    })
}

impl Store {
    /// Record a user prompt and return the stored row.
    ///
    /// # Errors
    /// Returns error if the insert fails.
    pub fn insert_prompt(
        &self,
        content_session_id: &str,
        project: &str,
        prompt_number: u32,
        prompt_text: &str,
    ) -> Result<UserPrompt> {
        let conn = get_conn(&self.pool)?;
        let now = now_epoch_ms();
        conn.execute(
            "INSERT INTO user_prompts
               (content_session_id, project, prompt_number, prompt_text, created_at_epoch)
               VALUES (?1, ?2, ?3, ?4, ?5)",
            params![content_session_id, project, prompt_number, prompt_text, now],
        )?;
        Ok(UserPrompt {
            id: conn.last_insert_rowid(),
            content_session_id: content_session_id.to_owned(),
            project: project.to_owned(),
            prompt_number,
            prompt_text: prompt_text.to_owned(),
            created_at_epoch: now,
        })
    }

    /// Newest-first page of user prompts.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn prompts_page(
        &self,
        project: Option<&str>,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<UserPrompt>> {
        let conn = get_conn(&self.pool)?;
        let cursor = after_id.unwrap_or(i64::MAX);
        let results = if let Some(p) = project {
            let mut stmt = conn.prepare(
                "SELECT id, content_session_id, project, prompt_number, prompt_text, created_at_epoch
                   FROM user_prompts WHERE project = ?1 AND id < ?2 ORDER BY id DESC LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![p, cursor, limit], row_to_prompt)?
                .filter_map(log_row_error)
                .collect();
            rows
        } else {
            let mut stmt = conn.prepare(
                "SELECT id, content_session_id, project, prompt_number, prompt_text, created_at_epoch
                   FROM user_prompts WHERE id < ?1 ORDER BY id DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![cursor, limit], row_to_prompt)?
                .filter_map(log_row_error)
                .collect();
            rows
        };
        Ok(results)
    }
}
