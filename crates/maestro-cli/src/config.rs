//! Runtime configuration.
//!
//! Layered once at startup, later layers winning:
//!
//! 1. built-in defaults
//! 2. `config/default.toml` (or the file given with `--config`)
//! 3. environment (`MAESTRO_RULES`, `MAESTRO_DATA_DIR`,
//!    `MAESTRO_DEFAULT_PERSONA`), with `.env` loaded by `dotenvy`
//! 4. command-line flags (`--rules`, `--no-store`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use maestro_kernel::{
    Category, CategoryPriority, DEFAULT_COORDINATION_CUES, DEFAULT_PERSONA, MatchMode,
    SelectorConfig,
};
use serde::Deserialize;
use tracing::debug;

use crate::cli::GlobalArgs;

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";
const DB_FILE_NAME: &str = "maestro.db";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Parsed `config/default.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaestroConfig {
    pub selector: SelectorSection,
    pub store: StoreSection,
    pub rules: RulesSection,
}

/// `[selector]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorSection {
    pub default_persona: String,
    pub match_mode: MatchMode,
    pub coordination_cues: Vec<String>,
    /// Replaces the built-in tie-break order; must list every category once.
    pub category_priority: Option<Vec<Category>>,
}

impl Default for SelectorSection {
    fn default() -> Self {
        Self {
            default_persona: DEFAULT_PERSONA.to_string(),
            match_mode: MatchMode::default(),
            coordination_cues: DEFAULT_COORDINATION_CUES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            category_priority: None,
        }
    }
}

/// `[store]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub data_dir: PathBuf,
    pub enabled: bool,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            enabled: true,
        }
    }
}

/// `[rules]`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulesSection {
    /// Rule table on disk. The embedded table is used when unset.
    pub path: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl MaestroConfig {
    /// Build the effective configuration for this invocation.
    pub fn resolve(args: &GlobalArgs) -> Result<Self> {
        // A missing .env is the normal case.
        let _ = dotenvy::dotenv();

        let mut config = Self::load(args.config.as_deref())?;
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_args(args);
        Ok(config)
    }

    /// Read the TOML layer.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p, true),
            None => (Path::new(DEFAULT_CONFIG_PATH), false),
        };

        if !required && !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Overlay environment variables, looked up through `var`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(rules) = non_empty("MAESTRO_RULES") {
            self.rules.path = Some(PathBuf::from(rules));
        }
        if let Some(dir) = non_empty("MAESTRO_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(persona) = non_empty("MAESTRO_DEFAULT_PERSONA") {
            self.selector.default_persona = persona.trim().to_string();
        }
    }

    pub fn apply_args(&mut self, args: &GlobalArgs) {
        if let Some(rules) = &args.rules {
            self.rules.path = Some(rules.clone());
        }
        if args.no_store {
            self.store.enabled = false;
        }
    }

    /// Selector settings, with the category order validated.
    pub fn selector_config(&self) -> Result<SelectorConfig> {
        let priority = match &self.selector.category_priority {
            Some(order) => CategoryPriority::from_order(order.clone())
                .context("invalid [selector] category_priority")?,
            None => CategoryPriority::default(),
        };

        Ok(SelectorConfig {
            default_persona: self.selector.default_persona.clone(),
            match_mode: self.selector.match_mode,
            coordination_cues: self
                .selector
                .coordination_cues
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
            priority,
        })
    }

    /// Location of the session database.
    pub fn db_path(&self) -> PathBuf {
        self.store.data_dir.join(DB_FILE_NAME)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
