//! Integration tests for the maestro-store crate.
//!
//! Exercise migrations and session persistence against a real SQLite file
//! on disk (via tempfile), including reopening the file the way a second
//! CLI invocation would.

use maestro_store::{Database, NewSelection, SessionStore, StoreError, migration};

fn pick(request: &str, personas: &[&str], reason: &str) -> NewSelection {
    NewSelection {
        request: request.into(),
        personas: personas.iter().map(|p| p.to_string()).collect(),
        coordinated: personas.len() > 1,
        reason: reason.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn database_open_and_migrate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("maestro.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();
    let version = db.call(|conn| migration::current_version(conn)).await.unwrap();

    assert_eq!(version, migration::latest_version());
    assert!(db_path.exists());
}

#[tokio::test]
async fn database_open_and_migrate_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("maestro.db");

    Database::open_and_migrate(db_path.clone()).await.unwrap();
    let db = Database::open_and_migrate(db_path).await.unwrap();
    let rows: i64 = db
        .call(|conn| Ok(conn.query_row("SELECT count(*) FROM _migrations", [], |row| row.get(0))?))
        .await
        .unwrap();
    assert_eq!(rows, i64::from(migration::latest_version()));
}

// ═══════════════════════════════════════════════════════════════════════
//  Sessions
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn session_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("maestro.db");

    {
        let store = SessionStore::new(Database::open_and_migrate(db_path.clone()).await.unwrap());
        store.open_or_create("review").await.unwrap();
        store
            .append("review", pick("React hooks question", &["react-expert"], "single_match"))
            .await
            .unwrap();
        store
            .append(
                "review",
                pick(
                    "full-stack react and python app",
                    &["python-expert", "react-expert"],
                    "priority",
                ),
            )
            .await
            .unwrap();
    }

    let store = SessionStore::new(Database::open_and_migrate(db_path).await.unwrap());
    let session = store.get("review").await.unwrap();
    assert_eq!(session.request_count, 2);
    assert_eq!(session.active_persona.as_deref(), Some("python-expert"));

    let history = store.history("review", None).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].request, "React hooks question");
    assert!(!history[0].coordinated);
    assert_eq!(history[1].personas, vec!["python-expert", "react-expert"]);
    assert!(history[1].coordinated);
    assert_eq!(history[1].reason, "priority");
}

#[tokio::test]
async fn sessions_are_isolated() {
    let store = SessionStore::new(Database::open_and_migrate_in_memory().await.unwrap());
    store.open_or_create("a").await.unwrap();
    store.open_or_create("b").await.unwrap();
    store
        .append("a", pick("jest snapshot", &["jest-expert"], "single_match"))
        .await
        .unwrap();

    assert_eq!(store.history("a", None).await.unwrap().len(), 1);
    assert!(store.history("b", None).await.unwrap().is_empty());
    assert!(store.get("b").await.unwrap().active_persona.is_none());
}

#[tokio::test]
async fn concurrent_appends_to_different_sessions() {
    let store = SessionStore::new(Database::open_and_migrate_in_memory().await.unwrap());
    let ids = ["s1", "s2", "s3", "s4"];
    for id in ids {
        store.open_or_create(id).await.unwrap();
    }

    let mut handles = Vec::new();
    for id in ids {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            for n in 0..5 {
                store
                    .append(id, pick(&format!("request {n}"), &["python-expert"], "single_match"))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    for id in ids {
        let history = store.history(id, None).await.unwrap();
        let requests: Vec<_> = history.iter().map(|s| s.request.as_str()).collect();
        assert_eq!(
            requests,
            vec!["request 0", "request 1", "request 2", "request 3", "request 4"]
        );
    }
    let usage = store.usage(None).await.unwrap();
    assert_eq!(usage[0].total, 20);
}

#[tokio::test]
async fn deleted_session_reports_not_found() {
    let store = SessionStore::new(Database::open_and_migrate_in_memory().await.unwrap());
    store.open_or_create("gone").await.unwrap();
    store.delete("gone").await.unwrap();

    let err = store.get("gone").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "session", .. }));
    assert_eq!(err.to_string(), "session not found: gone");
}
