//! Migration v1: Initial schema

pub(super) const SQL: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_session_id TEXT NOT NULL,
    agent_session_id TEXT,
    project TEXT NOT NULL,
    user_prompt TEXT,
    last_prompt_number INTEGER NOT NULL DEFAULT 1,
    input_tokens INTEGER NOT NULL DEFAULT 0,
    output_tokens INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'active',
    started_at_epoch INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_session_id TEXT NOT NULL,
    project TEXT NOT NULL,
    observation_type TEXT NOT NULL DEFAULT '',
    title TEXT NOT NULL DEFAULT '',
    subtitle TEXT,
    narrative TEXT,
    text TEXT,
    facts TEXT NOT NULL DEFAULT '[]',
    concepts TEXT NOT NULL DEFAULT '[]',
    files_read TEXT NOT NULL DEFAULT '[]',
    files_modified TEXT NOT NULL DEFAULT '[]',
    prompt_number INTEGER,
    discovery_tokens INTEGER NOT NULL DEFAULT 0,
    created_at_epoch INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS session_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_session_id TEXT NOT NULL,
    project TEXT NOT NULL,
    request TEXT,
    investigated TEXT,
    learned TEXT,
    completed TEXT,
    next_steps TEXT,
    notes TEXT,
    prompt_number INTEGER,
    discovery_tokens INTEGER NOT NULL DEFAULT 0,
    created_at_epoch INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_prompts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_session_id TEXT NOT NULL,
    project TEXT NOT NULL DEFAULT '',
    prompt_number INTEGER NOT NULL,
    prompt_text TEXT NOT NULL,
    created_at_epoch INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS pending_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    content_session_id TEXT NOT NULL,
    kind TEXT NOT NULL DEFAULT 'observation',
    status TEXT NOT NULL DEFAULT 'pending',
    tool_name TEXT,
    tool_input TEXT,
    tool_response TEXT,
    cwd TEXT,
    prompt_number INTEGER,
    last_user_message TEXT,
    last_assistant_message TEXT,
    created_at_epoch INTEGER NOT NULL,
    completed_at_epoch INTEGER
);

CREATE INDEX IF NOT EXISTS idx_observations_session ON observations(content_session_id);
CREATE INDEX IF NOT EXISTS idx_observations_project ON observations(project);
CREATE INDEX IF NOT EXISTS idx_observations_created ON observations(created_at_epoch);
CREATE INDEX IF NOT EXISTS idx_sessions_content ON sessions(content_session_id);
CREATE INDEX IF NOT EXISTS idx_summaries_session ON session_summaries(content_session_id);
CREATE INDEX IF NOT EXISTS idx_pending_session_status ON pending_messages(content_session_id, status, id);
";
