//! Versioned schema migrations.
//!
//! Each [`Migration`] is a static SQL batch. Applied versions are recorded
//! in `_migrations`, so running the list again is a no-op.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

struct Migration {
    /// Strictly increasing, starting at 1.
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Append only.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "sessions and their selection history",
        sql: r#"
            CREATE TABLE sessions (
                id             TEXT PRIMARY KEY,
                active_persona TEXT,
                request_count  INTEGER NOT NULL DEFAULT 0,
                created_at     INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL
            );

            CREATE TABLE selections (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                request         TEXT NOT NULL,
                personas        TEXT NOT NULL,
                primary_persona TEXT NOT NULL,
                coordinated     BOOLEAN NOT NULL DEFAULT 0,
                reason          TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX idx_selections_session ON selections(session_id, id);
        "#,
    },
    Migration {
        version: 2,
        description: "persona membership index for usage statistics",
        sql: r#"
            CREATE TABLE selection_personas (
                selection_id INTEGER NOT NULL REFERENCES selections(id) ON DELETE CASCADE,
                position     INTEGER NOT NULL,
                persona      TEXT NOT NULL,
                PRIMARY KEY (selection_id, position)
            );
            CREATE INDEX idx_selection_personas_persona ON selection_personas(persona);

            INSERT INTO selection_personas (selection_id, position, persona)
                SELECT s.id, j.key, j.value FROM selections s, json_each(s.personas) j;
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Apply every migration newer than the recorded version.
///
/// Synchronous; run it through [`crate::Database::migrate`] from async code.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        apply(conn, migration)?;
        applied += 1;
    }

    if applied == 0 {
        debug!(version = current, "schema is up to date");
    } else {
        info!(from = current, applied, "schema migrated");
    }
    Ok(())
}

/// Highest applied migration version, or 0 for a fresh database.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("cannot read schema version: {e}"),
    })
}

/// Version the newest migration brings the schema to.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("cannot create _migrations: {e}"),
    })
}

/// Apply one migration atomically.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let fail = |message: String| StoreError::Migration {
        version: migration.version,
        message,
    };

    info!(version = migration.version, description = migration.description, "applying migration");
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| fail(format!("cannot begin: {e}")))?;

    let body = conn
        .execute_batch(migration.sql)
        .map_err(|e| fail(format!("sql failed: {e}")))
        .and_then(|()| {
            conn.execute(
                "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().timestamp()
                ],
            )
            .map_err(|e| fail(format!("cannot record version: {e}")))
        });

    match body {
        Ok(_) => conn
            .execute_batch("COMMIT;")
            .map_err(|e| fail(format!("cannot commit: {e}"))),
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
            Err(err)
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    #[test]
    fn versions_strictly_increase() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[1].version > pair[0].version);
        }
        assert_eq!(MIGRATIONS[0].version, 1);
    }

    #[test]
    fn fresh_database_reaches_latest() {
        let conn = conn();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), latest_version());
        assert_eq!(latest_version(), 2);
    }

    #[test]
    fn rerun_is_noop() {
        let conn = conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT count(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, i64::from(latest_version()));
    }

    #[test]
    fn v2_backfills_existing_selections() {
        let conn = conn();
        ensure_migrations_table(&conn).unwrap();
        apply(&conn, &MIGRATIONS[0]).unwrap();

        conn.execute_batch(
            "INSERT INTO sessions (id, request_count, created_at, updated_at) VALUES ('s', 1, 0, 0);
             INSERT INTO selections (session_id, request, personas, primary_persona, coordinated, reason, created_at)
                 VALUES ('s', 'full-stack react and python', '[\"python-expert\",\"react-expert\"]', 'python-expert', 1, 'priority', 0);",
        )
        .unwrap();

        run_all(&conn).unwrap();

        let personas: Vec<String> = conn
            .prepare("SELECT persona FROM selection_personas ORDER BY position")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(personas, vec!["python-expert", "react-expert"]);
    }

    #[test]
    fn deleting_a_session_cascades() {
        let conn = conn();
        run_all(&conn).unwrap();
        conn.execute_batch(
            "INSERT INTO sessions (id, created_at, updated_at) VALUES ('s', 0, 0);
             INSERT INTO selections (session_id, request, personas, primary_persona, reason, created_at)
                 VALUES ('s', 'jest', '[\"jest-expert\"]', 'jest-expert', 'single_match', 0);
             INSERT INTO selection_personas (selection_id, position, persona) VALUES (1, 0, 'jest-expert');
             DELETE FROM sessions WHERE id = 's';",
        )
        .unwrap();

        let left: i64 = conn
            .query_row("SELECT count(*) FROM selection_personas", [], |row| row.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }
}
