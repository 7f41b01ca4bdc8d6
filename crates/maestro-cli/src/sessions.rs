//! Subcommands: `maestro sessions` and `maestro stats`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use maestro_store::{PersonaUsage, SelectionRecord, SessionRecord};

use crate::cli::SessionAction;
use crate::helpers::{format_timestamp, truncate};
use crate::runtime::App;

pub async fn cmd_sessions(app: &App, action: SessionAction) -> Result<()> {
    let store = app.store()?;
    match action {
        SessionAction::List { limit } => {
            let sessions = store
                .list(limit, 0)
                .await
                .context("failed to list sessions")?;
            print!("{}", render_session_list(&sessions));
        }
        SessionAction::Show { id } => {
            let session = store.get(&id).await.context("failed to load session")?;
            let history = store
                .history(&id, None)
                .await
                .context("failed to load session history")?;
            print!("{}", render_session(&session, &history));
        }
        SessionAction::Delete { id } => {
            store
                .delete(&id)
                .await
                .with_context(|| format!("failed to delete session {id}"))?;
            println!("  Deleted session: {id}");
        }
    }
    Ok(())
}

pub async fn cmd_stats(app: &App, session: Option<&str>) -> Result<()> {
    let store = app.store()?;
    if let Some(id) = session {
        // Distinguish an unknown session from one with no selections.
        store.get(id).await.context("failed to load session")?;
    }
    let usage = store
        .usage(session)
        .await
        .context("failed to compute persona usage")?;
    print!("{}", render_usage(&usage));
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn render_session_list(sessions: &[SessionRecord]) -> String {
    if sessions.is_empty() {
        return "  No saved sessions.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "  {:<38} {:<26} {:>8}  {}",
        "SESSION", "ACTIVE PERSONA", "REQUESTS", "UPDATED"
    );
    for s in sessions {
        let _ = writeln!(
            out,
            "  {:<38} {:<26} {:>8}  {}",
            s.id,
            s.active_persona.as_deref().unwrap_or("-"),
            s.request_count,
            format_timestamp(s.updated_at)
        );
    }
    out
}

fn render_session(session: &SessionRecord, history: &[SelectionRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  Session: {}", session.id);
    let _ = writeln!(
        out,
        "  Active:  {}",
        session.active_persona.as_deref().unwrap_or("(none)")
    );
    let _ = writeln!(out, "  Created: {}", format_timestamp(session.created_at));
    let _ = writeln!(out);

    if history.is_empty() {
        let _ = writeln!(out, "  (no requests yet)");
        return out;
    }
    for (n, record) in history.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {:>3}. [{}] {} -> {}{}",
            n + 1,
            record.reason,
            truncate(&record.request, 60),
            record.personas.join(", "),
            if record.coordinated { " (coordinated)" } else { "" }
        );
    }
    out
}

fn render_usage(usage: &[PersonaUsage]) -> String {
    if usage.is_empty() {
        return "  No selections recorded.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(out, "  {:<28} {:>8} {:>8}", "PERSONA", "PRIMARY", "TOTAL");
    for u in usage {
        let _ = writeln!(out, "  {:<28} {:>8} {:>8}", u.persona, u.as_primary, u.total);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(request: &str, personas: &[&str], coordinated: bool) -> SelectionRecord {
        SelectionRecord {
            id: 1,
            session_id: "s".into(),
            request: request.into(),
            personas: personas.iter().map(|p| p.to_string()).collect(),
            coordinated,
            reason: "priority".into(),
            created_at: 0,
        }
    }

    #[test]
    fn session_history_is_numbered() {
        let session = SessionRecord {
            id: "s".into(),
            active_persona: Some("python-expert".into()),
            request_count: 1,
            created_at: 0,
            updated_at: 0,
        };
        let text = render_session(
            &session,
            &[record("full-stack react python", &["python-expert", "react-expert"], true)],
        );
        assert!(text.contains("Active:  python-expert"));
        assert!(text.contains(
            "  1. [priority] full-stack react python -> python-expert, react-expert (coordinated)"
        ));
    }

    #[test]
    fn empty_outputs_have_placeholders() {
        assert_eq!(render_session_list(&[]), "  No saved sessions.\n");
        assert_eq!(render_usage(&[]), "  No selections recorded.\n");
    }

    #[test]
    fn usage_rows_are_aligned() {
        let text = render_usage(&[PersonaUsage {
            persona: "react-expert".into(),
            as_primary: 2,
            total: 3,
        }]);
        assert!(text.lines().nth(1).unwrap().trim_start().starts_with("react-expert"));
    }
}
