//! Subcommands: `maestro personas` and `maestro check`.

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{Context, Result};
use maestro_kernel::{Category, CategoryPriority, ExpertSelector, RuleTable};
use tracing::warn;

use crate::config::MaestroConfig;
use crate::runtime::build_selector;

/// List personas grouped by category, in priority order.
pub fn cmd_personas(config: &MaestroConfig, category: Option<&str>) -> Result<()> {
    let selector = build_selector(config)?;
    let filter = category
        .map(|c| c.parse::<Category>())
        .transpose()
        .context("invalid --category")?;

    print!(
        "{}",
        render_personas(selector.table(), &selector.config().priority, filter)
    );
    Ok(())
}

pub fn render_personas(
    table: &RuleTable,
    priority: &CategoryPriority,
    only: Option<Category>,
) -> String {
    let mut out = String::new();
    for &category in priority.as_slice() {
        if only.is_some_and(|c| c != category) {
            continue;
        }
        let rules: Vec<_> = table.by_category(category).collect();
        if rules.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{category} ({})", rules.len());
        for rule in rules {
            let _ = writeln!(
                out,
                "  {:<28} {:<22} {}",
                rule.persona_id,
                rule.label,
                rule.trigger_terms.join(", ")
            );
        }
    }
    out
}

/// Validate configuration and rule table; any error exits non-zero.
pub fn cmd_check(config: &MaestroConfig) -> Result<()> {
    let selector = build_selector(config)?;
    let shared = shared_terms(selector.table());
    for (term, owners) in &shared {
        warn!(
            term = %term,
            personas = %owners.join(", "),
            "trigger term shared by several personas"
        );
    }

    print!("{}", render_summary(&selector, config, shared.len()));
    Ok(())
}

fn render_summary(selector: &ExpertSelector, config: &MaestroConfig, shared: usize) -> String {
    let table = selector.table();
    let settings = selector.config();
    let source = config
        .rules
        .path
        .as_deref()
        .map_or_else(|| "embedded".to_string(), |p| p.display().to_string());
    let order: Vec<&str> = settings.priority.as_slice().iter().map(|c| c.as_str()).collect();

    let mut out = String::new();
    let _ = writeln!(out, "rule table:      ok ({source})");
    let _ = writeln!(out, "personas:        {}", table.len());
    let _ = writeln!(out, "trigger terms:   {}", table.term_count());
    let _ = writeln!(out, "shared terms:    {shared}");
    let _ = writeln!(out, "default persona: {}", settings.default_persona);
    let _ = writeln!(out, "match mode:      {:?}", settings.match_mode);
    let _ = writeln!(out, "priority:        {}", order.join(" > "));
    let _ = writeln!(
        out,
        "session store:   {}",
        if config.store.enabled {
            config.db_path().display().to_string()
        } else {
            "disabled".to_string()
        }
    );
    out
}

/// Terms that trigger more than one persona, sorted by term.
fn shared_terms(table: &RuleTable) -> Vec<(String, Vec<String>)> {
    let mut owners: HashMap<&str, Vec<String>> = HashMap::new();
    for rule in table.iter() {
        for term in &rule.trigger_terms {
            owners
                .entry(term.as_str())
                .or_default()
                .push(rule.persona_id.clone());
        }
    }
    let mut shared: Vec<_> = owners
        .into_iter()
        .filter(|(_, personas)| personas.len() > 1)
        .map(|(term, personas)| (term.to_string(), personas))
        .collect();
    shared.sort();
    shared
}

#[cfg(test)]
mod tests {
    use maestro_kernel::PersonaRule;

    use super::*;

    #[test]
    fn listing_follows_priority_and_filter() {
        let table = RuleTable::builtin().unwrap();
        let priority = CategoryPriority::default();

        let all = render_personas(&table, &priority, None);
        let architecture = all.find("architecture (").unwrap();
        let frontend = all.find("frontend (").unwrap();
        assert!(architecture < frontend);

        let only = render_personas(&table, &priority, Some(Category::Testing));
        assert!(only.starts_with("testing ("));
        assert!(only.contains("jest-expert"));
        assert!(!only.contains("react-expert"));
    }

    #[test]
    fn shared_terms_are_reported() {
        let table = RuleTable::from_rules([
            PersonaRule::new("a", "A", Category::Backend, ["api", "rust"]),
            PersonaRule::new("b", "B", Category::Frontend, ["api"]),
        ])
        .unwrap();
        assert_eq!(
            shared_terms(&table),
            vec![("api".to_string(), vec!["a".to_string(), "b".to_string()])]
        );
    }

    #[test]
    fn summary_reports_defaults() {
        let config = MaestroConfig::default();
        let selector = build_selector(&config).unwrap();
        let text = render_summary(&selector, &config, 0);
        assert!(text.contains("rule table:      ok (embedded)"));
        assert!(text.contains("default persona: frontend-design"));
        assert!(text.contains("architecture > backend > frontend"));
    }
}
