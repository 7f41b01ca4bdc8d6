//! Persistent selector sessions.
//!
//! A session row mirrors one conversation context: the active persona and
//! how many requests it has seen. Every selection made in the session is
//! appended to `selections`, with one `selection_personas` row per chosen
//! persona so usage statistics never have to parse JSON.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A stored selector session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    /// Primary persona of the latest selection, `None` before the first one.
    pub active_persona: Option<String>,
    pub request_count: i64,
    /// Unix timestamp.
    pub created_at: i64,
    /// Unix timestamp.
    pub updated_at: i64,
}

/// One past selection, in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub id: i64,
    pub session_id: String,
    pub request: String,
    /// Primary persona first.
    pub personas: Vec<String>,
    pub coordinated: bool,
    /// How the primary was chosen (`single_match`, `continuity`, ...).
    pub reason: String,
    pub created_at: i64,
}

impl SelectionRecord {
    /// The persona that answered this request.
    pub fn primary(&self) -> Option<&str> {
        self.personas.first().map(String::as_str)
    }
}

/// A selection about to be appended.
#[derive(Debug, Clone)]
pub struct NewSelection {
    pub request: String,
    pub personas: Vec<String>,
    pub coordinated: bool,
    pub reason: String,
}

/// How often a persona was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaUsage {
    pub persona: String,
    /// Times it was the primary persona.
    pub as_primary: i64,
    /// Times it appeared at all, primary or secondary.
    pub total: i64,
}

// ═══════════════════════════════════════════════════════════════════════
//  SessionStore
// ═══════════════════════════════════════════════════════════════════════

const SESSION_COLUMNS: &str = "id, active_persona, request_count, created_at, updated_at";

/// CRUD over sessions and their selection history.
#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a session with a fresh UUID v7 identifier.
    #[instrument(skip(self))]
    pub async fn create(&self) -> StoreResult<SessionRecord> {
        let id = Uuid::now_v7().to_string();
        self.open_or_create(&id).await
    }

    /// Return the session `id`, creating an empty one if it does not exist.
    #[instrument(skip(self))]
    pub async fn open_or_create(&self, id: &str) -> StoreResult<SessionRecord> {
        if id.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "session id must not be empty".into(),
            ));
        }
        let id = id.to_string();
        let now = Utc::now().timestamp();

        self.db
            .call(move |conn| {
                let inserted = conn.execute(
                    "INSERT OR IGNORE INTO sessions (id, request_count, created_at, updated_at) \
                     VALUES (?1, 0, ?2, ?2)",
                    rusqlite::params![id, now],
                )?;
                if inserted > 0 {
                    debug!(session_id = %id, "session created");
                }
                fetch_session(conn, &id)?.ok_or(StoreError::NotFound {
                    entity: "session",
                    id,
                })
            })
            .await
    }

    /// Fetch a session, failing with [`StoreError::NotFound`] if absent.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<SessionRecord> {
        let id = id.to_string();
        self.db
            .call(move |conn| {
                fetch_session(conn, &id)?.ok_or(StoreError::NotFound {
                    entity: "session",
                    id,
                })
            })
            .await
    }

    /// Fetch a session if it exists.
    #[instrument(skip(self))]
    pub async fn find(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let id = id.to_string();
        self.db.call(move |conn| fetch_session(conn, &id)).await
    }

    /// Sessions ordered by most recently updated.
    #[instrument(skip(self))]
    pub async fn list(&self, limit: u32, offset: u32) -> StoreResult<Vec<SessionRecord>> {
        self.db
            .call(move |conn| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions \
                     ORDER BY updated_at DESC, id ASC LIMIT ?1 OFFSET ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params![limit, offset], session_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Delete a session and, by cascade, its whole history.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .call(move |conn| {
                let deleted =
                    conn.execute("DELETE FROM sessions WHERE id = ?1", rusqlite::params![id])?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "session",
                        id,
                    });
                }
                debug!(session_id = %id, "session deleted");
                Ok(())
            })
            .await
    }

    /// Append a selection to an existing session.
    ///
    /// Updates the session's active persona, request count and `updated_at`
    /// in the same transaction. Returns the new selection's row id.
    #[instrument(skip(self, selection), fields(personas = selection.personas.len()))]
    pub async fn append(&self, session_id: &str, selection: NewSelection) -> StoreResult<i64> {
        let Some(primary) = selection.personas.first().cloned() else {
            return Err(StoreError::InvalidArgument(
                "a selection needs at least one persona".into(),
            ));
        };
        let session_id = session_id.to_string();
        let personas_json = serde_json::to_string(&selection.personas)?;
        let now = Utc::now().timestamp();

        self.db
            .call_mut(move |conn| {
                let tx = conn.transaction()?;

                let updated = tx.execute(
                    "UPDATE sessions SET active_persona = ?2, request_count = request_count + 1, \
                     updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![session_id, primary, now],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "session",
                        id: session_id,
                    });
                }

                tx.execute(
                    "INSERT INTO selections \
                     (session_id, request, personas, primary_persona, coordinated, reason, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        session_id,
                        selection.request,
                        personas_json,
                        primary,
                        selection.coordinated,
                        selection.reason,
                        now
                    ],
                )?;
                let selection_id = tx.last_insert_rowid();

                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO selection_personas (selection_id, position, persona) \
                         VALUES (?1, ?2, ?3)",
                    )?;
                    for (position, persona) in selection.personas.iter().enumerate() {
                        stmt.execute(rusqlite::params![selection_id, position as i64, persona])?;
                    }
                }

                tx.commit()?;
                debug!(session_id = %session_id, selection_id, "selection appended");
                Ok(selection_id)
            })
            .await
    }

    /// Selections of a session in the order they were made.
    ///
    /// With `limit = Some(n)` only the most recent `n` are returned, still
    /// oldest first.
    #[instrument(skip(self))]
    pub async fn history(
        &self,
        session_id: &str,
        limit: Option<u32>,
    ) -> StoreResult<Vec<SelectionRecord>> {
        let session_id = session_id.to_string();
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, i64::from);

        self.db
            .call(move |conn| {
                if fetch_session(conn, &session_id)?.is_none() {
                    return Err(StoreError::NotFound {
                        entity: "session",
                        id: session_id,
                    });
                }

                let mut stmt = conn.prepare(
                    "SELECT id, session_id, request, personas, coordinated, reason, created_at \
                     FROM (SELECT * FROM selections WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2) \
                     ORDER BY id ASC",
                )?;
                let raw = stmt
                    .query_map(rusqlite::params![session_id, limit], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, bool>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, i64>(6)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;

                raw.into_iter()
                    .map(
                        |(id, session_id, request, personas, coordinated, reason, created_at)|
                         -> StoreResult<SelectionRecord> {
                            Ok(SelectionRecord {
                                id,
                                session_id,
                                request,
                                personas: serde_json::from_str(&personas)?,
                                coordinated,
                                reason,
                                created_at,
                            })
                        },
                    )
                    .collect()
            })
            .await
    }

    /// Persona usage counts, across all sessions or within one.
    ///
    /// Ordered by total appearances, most used first.
    #[instrument(skip(self))]
    pub async fn usage(&self, session_id: Option<&str>) -> StoreResult<Vec<PersonaUsage>> {
        let session_id = session_id.map(str::to_string);
        self.db
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT sp.persona, \
                            SUM(CASE WHEN sp.position = 0 THEN 1 ELSE 0 END), \
                            COUNT(*) \
                     FROM selection_personas sp \
                     JOIN selections s ON s.id = sp.selection_id \
                     WHERE ?1 IS NULL OR s.session_id = ?1 \
                     GROUP BY sp.persona \
                     ORDER BY 3 DESC, 1 ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![session_id], |row| {
                        Ok(PersonaUsage {
                            persona: row.get(0)?,
                            as_primary: row.get(1)?,
                            total: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn fetch_session(conn: &Connection, id: &str) -> StoreResult<Option<SessionRecord>> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    Ok(conn
        .query_row(&sql, rusqlite::params![id], session_from_row)
        .optional()?)
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        active_persona: row.get(1)?,
        request_count: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
