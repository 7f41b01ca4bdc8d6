//! Startup wiring shared by every subcommand.
//!
//! [`App`] holds what is built once per process: the read-only selector,
//! the complexity analyzer and the optional session store. [`Session`] pairs
//! one conversation context with the store it is persisted to.

use std::sync::Arc;

use anyhow::{Context, Result};
use maestro_kernel::{
    ComplexityAnalyzer, ConversationContext, ExpertSelector, HistoryEntry, RuleTable, Selection,
    parse_rule_file,
};
use maestro_store::{Database, NewSelection, SessionStore};
use tracing::{debug, info, warn};

use crate::cli::GlobalArgs;
use crate::config::MaestroConfig;

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct App {
    pub selector: Arc<ExpertSelector>,
    pub analyzer: ComplexityAnalyzer,
    store: Option<SessionStore>,
}

impl App {
    /// Resolve configuration, load the rule table, and open the store.
    pub async fn init(args: &GlobalArgs) -> Result<Self> {
        let config = MaestroConfig::resolve(args)?;
        Self::from_config(&config).await
    }

    pub async fn from_config(config: &MaestroConfig) -> Result<Self> {
        let selector = build_selector(config)?;
        let analyzer = ComplexityAnalyzer::new().context("failed to build complexity analyzer")?;

        let store = if config.store.enabled {
            let path = config.db_path();
            let db = Database::open_and_migrate(path.clone())
                .await
                .with_context(|| format!("failed to open session store {}", path.display()))?;
            info!(path = %path.display(), "session store ready");
            Some(SessionStore::new(db))
        } else {
            debug!("session store disabled");
            None
        };

        Ok(Self {
            selector: Arc::new(selector),
            analyzer,
            store,
        })
    }

    /// The session store, or an error naming how to enable it.
    pub fn store(&self) -> Result<&SessionStore> {
        self.store
            .as_ref()
            .context("the session store is disabled ([store] enabled = false or --no-store)")
    }

    pub async fn open_session(&self, id: Option<&str>) -> Result<Session> {
        Session::open(&self.selector, self.store.clone(), id).await
    }

    /// Handle for workers that outlive a borrow of `self`.
    pub fn store_handle(&self) -> Option<SessionStore> {
        self.store.clone()
    }
}

/// Load the rule table named by the configuration, or the embedded one.
pub fn load_rule_table(config: &MaestroConfig) -> Result<RuleTable> {
    let table = match &config.rules.path {
        Some(path) => parse_rule_file(path)
            .with_context(|| format!("failed to load rule table {}", path.display()))?,
        None => RuleTable::builtin().context("embedded rule table is invalid")?,
    };
    let source = config
        .rules
        .path
        .as_deref()
        .map_or_else(|| "embedded".to_string(), |p| p.display().to_string());
    info!(
        personas = table.len(),
        terms = table.term_count(),
        source = %source,
        "rule table loaded"
    );
    Ok(table)
}

pub fn build_selector(config: &MaestroConfig) -> Result<ExpertSelector> {
    let table = load_rule_table(config)?;
    let selector_config = config.selector_config()?;
    ExpertSelector::new(table, selector_config).context("failed to build expert selector")
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One conversation, optionally backed by the store.
///
/// Only named sessions are persisted; an anonymous session lives for a
/// single invocation.
pub struct Session {
    ctx: ConversationContext,
    store: Option<SessionStore>,
}

impl Session {
    /// Open `id`, replaying its stored history, or start an anonymous one.
    pub async fn open(
        selector: &ExpertSelector,
        store: Option<SessionStore>,
        id: Option<&str>,
    ) -> Result<Self> {
        let Some(id) = id else {
            let ctx = ConversationContext::new(uuid::Uuid::now_v7().to_string());
            return Ok(Self { ctx, store: None });
        };

        let Some(store) = store else {
            warn!(session = id, "session store disabled, context will not be kept");
            return Ok(Self {
                ctx: ConversationContext::new(id),
                store: None,
            });
        };

        store
            .open_or_create(id)
            .await
            .with_context(|| format!("failed to open session {id}"))?;
        let history = store
            .history(id, None)
            .await
            .with_context(|| format!("failed to load history of session {id}"))?;
        let entries = history.into_iter().map(|record| HistoryEntry {
            request: record.request,
            personas: record.personas,
        });
        let ctx = selector
            .resume(id, entries)
            .with_context(|| {
                format!("session {id} cannot be resumed with the current rule table")
            })?;
        debug!(session = id, entries = ctx.history().len(), "session resumed");

        Ok(Self {
            ctx,
            store: Some(store),
        })
    }

    /// Route one request and persist the result.
    ///
    /// The context only advances once the selection is saved, so a failed
    /// save leaves it exactly as it was.
    pub async fn select(&mut self, selector: &ExpertSelector, request: &str) -> Result<Selection> {
        let selection = selector.evaluate(request, self.ctx.history())?;

        if let Some(store) = &self.store {
            let record = NewSelection {
                request: request.to_string(),
                personas: selection.personas().into_iter().map(str::to_string).collect(),
                coordinated: selection.coordinated,
                reason: selection.reason.as_str().to_string(),
            };
            store
                .append(self.ctx.session_id(), record)
                .await
                .context("failed to save selection")?;
        }
        selector.commit(&mut self.ctx, request, &selection);
        Ok(selection)
    }

    pub fn context(&self) -> &ConversationContext {
        &self.ctx
    }

    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }
}

#[cfg(test)]
mod tests {
    use maestro_kernel::SessionState;

    use super::*;

    fn config_in(dir: &std::path::Path) -> MaestroConfig {
        let mut config = MaestroConfig::default();
        config.store.data_dir = dir.to_path_buf();
        config
    }

    #[tokio::test]
    async fn named_session_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());

        {
            let app = App::from_config(&config).await.unwrap();
            let mut session = app.open_session(Some("work")).await.unwrap();
            session.select(&app.selector, "React hooks question").await.unwrap();
            assert!(session.is_persistent());
        }

        let app = App::from_config(&config).await.unwrap();
        let session = app.open_session(Some("work")).await.unwrap();
        assert_eq!(session.context().history().len(), 1);
        assert_eq!(
            session.context().state(),
            SessionState::PersonaActive("react-expert")
        );
        assert_eq!(app.store().unwrap().get("work").await.unwrap().request_count, 1);
    }

    #[tokio::test]
    async fn failed_save_leaves_context_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::from_config(&config_in(dir.path())).await.unwrap();
        let mut session = app.open_session(Some("s")).await.unwrap();
        app.store().unwrap().delete("s").await.unwrap();

        let result = session.select(&app.selector, "React hooks question").await;
        assert!(result.is_err());
        assert!(session.context().history().is_empty());
        assert_eq!(session.context().state(), SessionState::NoActivePersona);
    }

    #[tokio::test]
    async fn anonymous_session_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::from_config(&config_in(dir.path())).await.unwrap();
        let mut session = app.open_session(None).await.unwrap();
        session.select(&app.selector, "jest").await.unwrap();

        assert!(!session.is_persistent());
        assert!(app.store().unwrap().list(10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_store_keeps_context_in_memory() {
        let mut config = MaestroConfig::default();
        config.store.enabled = false;
        let app = App::from_config(&config).await.unwrap();
        assert!(app.store().is_err());

        let mut session = app.open_session(Some("s")).await.unwrap();
        session.select(&app.selector, "python").await.unwrap();
        assert_eq!(session.context().session_id(), "s");
        assert_eq!(session.context().active_persona(), Some("python-expert"));
    }

    #[tokio::test]
    async fn history_naming_removed_persona_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        {
            let app = App::from_config(&config).await.unwrap();
            let mut session = app.open_session(Some("old")).await.unwrap();
            session.select(&app.selector, "jest").await.unwrap();
        }

        let rules = dir.path().join("rules.md");
        std::fs::write(
            &rules,
            "## Frontend\n- **Design**: ui design → frontend-design\n",
        )
        .unwrap();
        let mut config = config;
        config.rules.path = Some(rules);

        let app = App::from_config(&config).await.unwrap();
        let err = app.open_session(Some("old")).await.err().unwrap();
        assert!(format!("{err:#}").contains("jest-expert"));
    }

    #[test]
    fn missing_rule_file_is_reported() {
        let mut config = MaestroConfig::default();
        config.rules.path = Some("/nonexistent/rules.md".into());
        let err = load_rule_table(&config).unwrap_err();
        assert!(err.to_string().contains("failed to load rule table"));
    }
}
