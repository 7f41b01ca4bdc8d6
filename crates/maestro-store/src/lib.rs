//! # maestro-store
//!
//! SQLite persistence for selector sessions.
//!
//! A session survives process restarts: its active persona and full
//! selection history are written here after every request, and reloaded
//! to rebuild the conversation context when the session is resumed.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  SessionStore (sessions, history, usage) │
//! ├──────────────────────────────────────────┤
//! │  Database (rusqlite WAL, blocking pool)  │
//! │  Migrations (versioned, transactional)   │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ```ignore
//! use maestro_store::{Database, SessionStore};
//!
//! let db = Database::open_and_migrate("data/maestro.db").await?;
//! let sessions = SessionStore::new(db);
//! let session = sessions.open_or_create("design-review").await?;
//! ```

pub mod db;
pub mod error;
pub mod migration;
pub mod session;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use session::{NewSelection, PersonaUsage, SelectionRecord, SessionRecord, SessionStore};
