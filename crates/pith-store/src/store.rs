use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::models::{
    AgentProfile, MemoryEntry, MemoryKind, MemorySearchHit, Message, MessageRole, NewMemoryEntry,
    NewMessage, Session, SessionSummary, UserProfile,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    last_activity_at TEXT NOT NULL,
    compaction_cursor INTEGER
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    tool_name TEXT,
    tool_args TEXT,
    tool_result TEXT,
    token_estimate INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at, id);

CREATE TABLE IF NOT EXISTS memory_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    kind TEXT NOT NULL,
    tags TEXT NOT NULL,
    source TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0
);

CREATE VIRTUAL TABLE IF NOT EXISTS memory_fts USING fts5(
    text, tags, content='memory_entries', content_rowid='id'
);

CREATE TABLE IF NOT EXISTS agent_profile (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    name TEXT NOT NULL DEFAULT '',
    nature TEXT NOT NULL DEFAULT '',
    vibe TEXT NOT NULL DEFAULT '',
    emoji TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS user_profile (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    name TEXT NOT NULL DEFAULT '',
    preferred_address TEXT NOT NULL DEFAULT '',
    timezone TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS session_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    from_msg_id INTEGER NOT NULL,
    to_msg_id INTEGER NOT NULL,
    summary_text TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Embedded relational + full-text store. All writes are serialised through
/// the inner mutex (SQLite itself is single-writer; readers go through the
/// same lock in this v1 implementation rather than a separate reader pool).
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `path` and apply the
    /// schema idempotently. A failure here is fatal at startup per the
    /// orchestrator's error-handling design.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("store schema initialised");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    // ── Sessions ─────────────────────────────────────────────────────────

    pub async fn create_session(&self, id: Option<String>) -> Result<Session> {
        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO sessions (id, created_at, last_activity_at, compaction_cursor) VALUES (?1, ?2, ?2, NULL)",
            params![id, now.to_rfc3339()],
        )?;
        Ok(Session { id, created_at: now, last_activity_at: now, compaction_cursor: None })
    }

    pub async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, created_at, last_activity_at, compaction_cursor FROM sessions WHERE id = ?1",
            params![id],
            row_to_session,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub async fn touch_session(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET last_activity_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub async fn set_compaction_cursor(&self, id: &str, msg_id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE sessions SET compaction_cursor = ?2 WHERE id = ?1",
            params![id, msg_id],
        )?;
        Ok(())
    }

    /// Total number of sessions ever created, for `GET /status`.
    pub async fn count_sessions(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(StoreError::from)
    }

    // ── Messages ─────────────────────────────────────────────────────────

    pub async fn append_message(&self, msg: NewMessage) -> Result<Message> {
        let now = Utc::now();
        let tool_args = msg.tool_args.as_ref().map(serde_json::to_string).transpose()?;
        let tool_result = msg.tool_result.as_ref().map(serde_json::to_string).transpose()?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages (session_id, role, text, tool_name, tool_args, tool_result, token_estimate, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.session_id,
                msg.role.as_str(),
                msg.text,
                msg.tool_name,
                tool_args,
                tool_result,
                msg.token_estimate,
                now.to_rfc3339(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Message {
            id,
            session_id: msg.session_id,
            role: msg.role,
            text: msg.text,
            tool_name: msg.tool_name,
            tool_args: msg.tool_args,
            tool_result: msg.tool_result,
            token_estimate: msg.token_estimate,
            created_at: now,
        })
    }

    /// List messages for a session, strictly ordered by (created_at, id),
    /// optionally only those after `since_id`, optionally capped to the
    /// most recent `limit`.
    pub async fn list_messages(
        &self,
        session_id: &str,
        since_id: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        let since_id = since_id.unwrap_or(0);
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, text, tool_name, tool_args, tool_result, token_estimate, created_at
             FROM messages WHERE session_id = ?1 AND id > ?2 ORDER BY created_at, id",
        )?;
        let mut rows: Vec<Message> = stmt
            .query_map(params![session_id, since_id], row_to_message)?
            .collect::<std::result::Result<_, _>>()?;
        if let Some(limit) = limit {
            let limit = limit.max(0) as usize;
            if rows.len() > limit {
                rows = rows.split_off(rows.len() - limit);
            }
        }
        Ok(rows)
    }

    // ── Memory ───────────────────────────────────────────────────────────

    pub async fn save_memory(&self, entry: NewMemoryEntry) -> Result<MemoryEntry> {
        let now = Utc::now();
        let tags = entry.tags.join(",");
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO memory_entries (text, kind, tags, source, created_at, updated_at, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, 0)",
            params![entry.text, entry.kind.as_str(), tags, entry.source, now.to_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO memory_fts (rowid, text, tags) VALUES (?1, ?2, ?3)",
            params![id, entry.text, tags],
        )?;
        tx.commit()?;
        Ok(MemoryEntry {
            id,
            text: entry.text,
            kind: entry.kind,
            tags: entry.tags,
            source: entry.source,
            created_at: now,
            updated_at: now,
            deleted: false,
        })
    }

    pub async fn soft_delete_memory(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().await;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE memory_entries SET deleted = 1, updated_at = ?2 WHERE id = ?1",
            params![id, Utc::now().to_rfc3339()],
        )?;
        tx.execute("DELETE FROM memory_fts WHERE rowid = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Full-text search ranked by FTS relevance with a recency tie-break:
    /// entries whose relevance is within 10% of the top hit's score are
    /// re-ordered by recency; entries outside that band keep relevance
    /// order. Soft-deleted entries never surface.
    pub async fn search_memory(&self, query: &str, limit: usize) -> Result<Vec<MemorySearchHit>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let fetch_n = (limit * 4).max(limit).max(20);
        let mut stmt = conn.prepare(
            "SELECT m.id, m.text, m.kind, m.tags, m.source, m.created_at, m.updated_at, m.deleted, bm25(memory_fts) as rank
             FROM memory_fts JOIN memory_entries m ON m.id = memory_fts.rowid
             WHERE memory_fts MATCH ?1 AND m.deleted = 0
             ORDER BY rank LIMIT ?2",
        )?;
        let mut hits: Vec<MemorySearchHit> = stmt
            .query_map(params![query, fetch_n as i64], |row| {
                let entry = row_to_memory_entry(row)?;
                // bm25() in SQLite's FTS5 is lower-is-better; negate so
                // higher is better here, matching the rest of this API.
                let rank: f64 = row.get(8)?;
                Ok(MemorySearchHit { entry, score: -rank })
            })?
            .collect::<std::result::Result<_, _>>()?;

        if hits.is_empty() {
            return Ok(hits);
        }

        let top_score = hits.iter().map(|h| h.score).fold(f64::MIN, f64::max);
        let band = top_score * 0.9;
        let (mut tied, rest): (Vec<_>, Vec<_>) = hits.drain(..).partition(|h| h.score >= band);
        tied.sort_by(|a, b| b.entry.updated_at.cmp(&a.entry.updated_at));
        tied.extend(rest);
        tied.truncate(limit);
        Ok(tied)
    }

    // ── Profiles ─────────────────────────────────────────────────────────

    pub async fn get_agent_profile(&self) -> Result<AgentProfile> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT name, nature, vibe, emoji, notes FROM agent_profile WHERE id = 1",
            [],
            |row| {
                Ok(AgentProfile {
                    name: row.get(0)?,
                    nature: row.get(1)?,
                    vibe: row.get(2)?,
                    emoji: row.get(3)?,
                    notes: row.get(4)?,
                })
            },
        )
        .optional()?
        .map_or_else(|| Ok(AgentProfile::default()), Ok)
    }

    pub async fn set_agent_profile(&self, profile: &AgentProfile) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO agent_profile (id, name, nature, vibe, emoji, notes) VALUES (1, ?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, nature=excluded.nature, vibe=excluded.vibe, emoji=excluded.emoji, notes=excluded.notes",
            params![profile.name, profile.nature, profile.vibe, profile.emoji, profile.notes],
        )?;
        Ok(())
    }

    pub async fn get_user_profile(&self) -> Result<UserProfile> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT name, preferred_address, timezone, notes FROM user_profile WHERE id = 1",
            [],
            |row| {
                Ok(UserProfile {
                    name: row.get(0)?,
                    preferred_address: row.get(1)?,
                    timezone: row.get(2)?,
                    notes: row.get(3)?,
                })
            },
        )
        .optional()?
        .map_or_else(|| Ok(UserProfile::default()), Ok)
    }

    pub async fn set_user_profile(&self, profile: &UserProfile) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO user_profile (id, name, preferred_address, timezone, notes) VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET name=excluded.name, preferred_address=excluded.preferred_address, timezone=excluded.timezone, notes=excluded.notes",
            params![profile.name, profile.preferred_address, profile.timezone, profile.notes],
        )?;
        Ok(())
    }

    // ── App state ────────────────────────────────────────────────────────

    pub async fn get_app_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT value FROM app_state WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()
        .map_err(StoreError::from)
    }

    pub async fn set_app_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub async fn bootstrap_complete(&self) -> Result<bool> {
        Ok(self.get_app_state("bootstrap_complete").await?.as_deref() == Some("true"))
    }

    pub async fn set_bootstrap_complete(&self, complete: bool) -> Result<()> {
        self.set_app_state("bootstrap_complete", if complete { "true" } else { "false" }).await
    }

    // ── Session summaries ────────────────────────────────────────────────

    pub async fn add_summary(
        &self,
        session_id: &str,
        from_msg_id: i64,
        to_msg_id: i64,
        summary_text: &str,
    ) -> Result<SessionSummary> {
        let now = Utc::now();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO session_summaries (session_id, from_msg_id, to_msg_id, summary_text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![session_id, from_msg_id, to_msg_id, summary_text, now.to_rfc3339()],
        )?;
        Ok(SessionSummary {
            id: conn.last_insert_rowid(),
            session_id: session_id.to_string(),
            from_msg_id,
            to_msg_id,
            summary_text: summary_text.to_string(),
            created_at: now,
        })
    }

    pub async fn list_summaries(&self, session_id: &str) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, from_msg_id, to_msg_id, summary_text, created_at
             FROM session_summaries WHERE session_id = ?1 ORDER BY from_msg_id",
        )?;
        let rows = stmt
            .query_map(params![session_id], row_to_summary)?
            .collect::<std::result::Result<_, _>>()?;
        Ok(rows)
    }
}

fn parse_dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        created_at: parse_dt(row.get(1)?),
        last_activity_at: parse_dt(row.get(2)?),
        compaction_cursor: row.get(3)?,
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = row.get(2)?;
    let tool_args: Option<String> = row.get(4)?;
    let tool_result: Option<String> = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: MessageRole::from_str(&role).unwrap_or(MessageRole::SystemInjected),
        text: row.get(3)?,
        tool_name: row.get(6)?,
        tool_args: tool_args.and_then(|s| serde_json::from_str(&s).ok()),
        tool_result: tool_result.and_then(|s| serde_json::from_str(&s).ok()),
        token_estimate: row.get(7)?,
        created_at: parse_dt(row.get(8)?),
    })
}

fn row_to_memory_entry(row: &rusqlite::Row) -> rusqlite::Result<MemoryEntry> {
    let kind: String = row.get(2)?;
    let tags: String = row.get(3)?;
    let deleted: i64 = row.get(7)?;
    Ok(MemoryEntry {
        id: row.get(0)?,
        text: row.get(1)?,
        kind: MemoryKind::from_str(&kind).unwrap_or(MemoryKind::Episodic),
        tags: if tags.is_empty() { Vec::new() } else { tags.split(',').map(String::from).collect() },
        source: row.get(4)?,
        created_at: parse_dt(row.get(5)?),
        updated_at: parse_dt(row.get(6)?),
        deleted: deleted != 0,
    })
}

fn row_to_summary(row: &rusqlite::Row) -> rusqlite::Result<SessionSummary> {
    Ok(SessionSummary {
        id: row.get(0)?,
        session_id: row.get(1)?,
        from_msg_id: row.get(2)?,
        to_msg_id: row.get(3)?,
        summary_text: row.get(4)?,
        created_at: parse_dt(row.get(5)?),
    })
}

// ── Tests ────────────────────────────────────────────────────────────────
