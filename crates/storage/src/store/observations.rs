use anyhow::Result;
use rusqlite::params;
use toolscribe_core::{Observation, ObservationDraft};

use super::{get_conn, log_row_error, now_epoch_ms, parse_string_list, Store};

const OBSERVATION_COLUMNS: &str = "id, content_session_id, project, observation_type, title,
            subtitle, narrative, text, facts, concepts, files_read, files_modified,
            prompt_number, discovery_tokens, created_at_epoch";

pub(crate) fn row_to_observation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get(0)?,
        content_session_id: row.get(1)?,
        project: row.get(2)?,
        observation_type: row.get(3)?,
        title: row.get(4)?,
        subtitle: row.get(5)?,
        narrative: row.get(6)?,
        text: row.get(7)?,
        facts: parse_string_list(&row.get::<_, String>(8)?),
        concepts: parse_string_list(&row.get::<_, String>(9)?),
        files_read: parse_string_list(&row.get::<_, String>(10)?),
        files_modified: parse_string_list(&row.get::<_, String>(11)?),
        prompt_number: row.get(12)?,
        discovery_tokens: row.get::<_, i64>(13)? as u64,
        created_at_epoch: row.get(14)?,
    })
}

impl Store {
    /// Insert one distilled observation and return the stored row.
    ///
    /// The returned row's `id` and `created_at_epoch` are the store-assigned
    /// values; insertion order per session matches id order.
    ///
    /// # Errors
    /// Returns error if the insert fails.
    pub fn insert_observation(
        &self,
        content_session_id: &str,
        project: &str,
        draft: &ObservationDraft,
        prompt_number: Option<u32>,
        discovery_tokens: u64,
    ) -> Result<Observation> {
        let conn = get_conn(&self.pool)?;
        let now = now_epoch_ms();
        conn.execute(
            "INSERT INTO observations
               (content_session_id, project, observation_type, title, subtitle, narrative, text,
                facts, concepts, files_read, files_modified, prompt_number, discovery_tokens,
                created_at_epoch)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                content_session_id,
                project,
                draft.observation_type,
                draft.title,
                draft.subtitle,
                draft.narrative,
                draft.text,
                serde_json::to_string(&draft.facts)?,
                serde_json::to_string(&draft.concepts)?,
                serde_json::to_string(&draft.files_read)?,
                serde_json::to_string(&draft.files_modified)?,
                prompt_number,
                discovery_tokens as i64,
                now,
            ],
        )?;
        Ok(Observation {
            id: conn.last_insert_rowid(),
            content_session_id: content_session_id.to_owned(),
            project: project.to_owned(),
            observation_type: draft.observation_type.clone(),
            title: draft.title.clone(),
            subtitle: draft.subtitle.clone(),
            narrative: draft.narrative.clone(),
            text: draft.text.clone(),
            facts: draft.facts.clone(),
            concepts: draft.concepts.clone(),
            files_read: draft.files_read.clone(),
            files_modified: draft.files_modified.clone(),
            prompt_number,
            discovery_tokens,
            created_at_epoch: now,
        })
    }

    /// Newest-first page of observations. `after_id` continues a previous
    /// page: only rows with a smaller id are returned.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn observations_page(
        &self,
        project: Option<&str>,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Observation>> {
        let conn = get_conn(&self.pool)?;
        let cursor = after_id.unwrap_or(i64::MAX);
        let results = if let Some(p) = project {
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations
                   WHERE project = ?1 AND id < ?2 ORDER BY id DESC LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![p, cursor, limit], row_to_observation)?
                .filter_map(log_row_error)
                .collect();
            rows
        } else {
            let sql = format!(
                "SELECT {OBSERVATION_COLUMNS} FROM observations
                   WHERE id < ?1 ORDER BY id DESC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![cursor, limit], row_to_observation)?
                .filter_map(log_row_error)
                .collect();
            rows
        };
        Ok(results)
    }

    /// All observations for one session, oldest first.
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn session_observations(&self, content_session_id: &str) -> Result<Vec<Observation>> {
        let conn = get_conn(&self.pool)?;
        let sql = format!(
            "SELECT {OBSERVATION_COLUMNS} FROM observations
               WHERE content_session_id = ?1 ORDER BY id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let results = stmt
            .query_map(params![content_session_id], row_to_observation)?
            .filter_map(log_row_error)
            .collect();
        Ok(results)
    }

    /// Total observation count (for stats output).
    ///
    /// # Errors
    /// Returns error if the query fails.
    pub fn observation_count(&self) -> Result<usize> {
        let conn = get_conn(&self.pool)?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM observations", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
