//! SQLite connection handle.
//!
//! [`Database`] owns one `rusqlite::Connection` behind an `Arc<Mutex<_>>`.
//! Every query runs on tokio's blocking pool through [`Database::call`] or
//! [`Database::call_mut`], so async callers never stall the runtime on disk
//! I/O.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Cloneable, thread-safe handle to the session database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path`.
    ///
    /// Blocking; prefer [`Database::open_and_migrate`] from async code.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::InvalidArgument(format!(
                    "cannot create data directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        info!(path = %path.display(), "opening session database");
        Self::from_connection(Connection::open(path)?)
    }

    /// A private in-memory database, used by tests and `--no-store` runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory session database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Open `path` on the blocking pool and bring the schema up to date.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory counterpart of [`Database::open_and_migrate`].
    pub async fn open_and_migrate_in_memory() -> StoreResult<Self> {
        let db = Self::open_in_memory()?;
        db.migrate().await?;
        Ok(db)
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> StoreResult<()> {
        self.call(migration::run_all).await
    }

    /// Run `f` against the connection on the blocking pool.
    pub async fn call<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await?
    }

    /// Like [`Database::call`] but with `&mut Connection`, for transactions.
    pub async fn call_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await?
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        // WAL lets readers proceed while a selection is being written.
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        // Two CLI processes sharing a session file wait instead of failing.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;
        debug!("session database pragmas applied");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> StoreResult<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::TaskJoin(format!("connection mutex poisoned: {e}")))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_answers_queries() {
        let db = Database::open_in_memory().unwrap();
        let one: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(one, 1);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = Database::open_in_memory().unwrap();
        let enabled: i64 = db
            .call(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn migrate_creates_session_tables() {
        let db = Database::open_in_memory().unwrap();
        db.migrate().await.unwrap();

        let count: i64 = db
            .call(|conn| {
                Ok(conn.query_row("SELECT count(*) FROM selections", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn call_mut_commits_a_transaction() {
        let db = Database::open_in_memory().unwrap();
        db.call_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);")?;
            tx.commit()?;
            Ok(())
        })
        .await
        .unwrap();

        let v: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT v FROM t", [], |row| row.get(0))?))
            .await
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("maestro.db");
        Database::open(&path).unwrap();
        assert!(path.exists());
    }
}
