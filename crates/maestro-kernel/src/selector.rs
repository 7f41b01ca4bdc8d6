//! Expert selector.
//!
//! Resolves free-text requests to persona ids using the static
//! [`RuleTable`]:
//!
//! | Step | Rule |
//! |------|------|
//! | 1 | Collect every persona with at least one trigger term in the request |
//! | 2 | No match: the configured default persona, nothing secondary |
//! | 3 | One match: that persona |
//! | 4 | Several: the match in the most recently active category of the session, else the best-ranked category |
//! | 5 | Several plus a project-level cue ("full-stack", ...): every match is kept as a coordination set |
//!
//! The selector holds no per-session state. Callers own a
//! [`ConversationContext`] per session and pass it to
//! [`ExpertSelector::select`], which records the outcome in it.
//!
//! # Example
//!
//! ```rust
//! # use maestro_kernel::{ConversationContext, ExpertSelector, RuleTable, SelectorConfig};
//! let selector = ExpertSelector::new(RuleTable::builtin().unwrap(), SelectorConfig::default()).unwrap();
//! let mut ctx = ConversationContext::new("demo");
//!
//! let selection = selector.select("Create a React component", &mut ctx).unwrap();
//! assert_eq!(selection.primary, "react-expert");
//! assert_eq!(ctx.active_persona(), Some("react-expert"));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::context::{ConversationContext, HistoryEntry};
use crate::error::{KernelError, Result};
use crate::matcher::{MatchMode, TermMatcher};
use crate::rules::{Category, CategoryPriority, RuleTable};

/// Persona used when nothing matches.
pub const DEFAULT_PERSONA: &str = "frontend-design";

/// Phrases that mark a request as project-level.
pub const DEFAULT_COORDINATION_CUES: [&str; 4] =
    ["full-stack", "platform", "end-to-end", "complete"];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Startup configuration for an [`ExpertSelector`].
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub default_persona: String,
    pub match_mode: MatchMode,
    pub coordination_cues: Vec<String>,
    pub priority: CategoryPriority,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            default_persona: DEFAULT_PERSONA.to_owned(),
            match_mode: MatchMode::default(),
            coordination_cues: DEFAULT_COORDINATION_CUES.iter().map(|c| (*c).to_owned()).collect(),
            priority: CategoryPriority::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Why the primary persona was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Exactly one persona matched.
    SingleMatch,
    /// Several matched; one shares the category most recently active in
    /// the session.
    Continuity,
    /// Several matched; the static category priority decided.
    Priority,
    /// Nothing matched; the default persona was used.
    Fallback,
}

impl SelectionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleMatch => "single_match",
            Self::Continuity => "continuity",
            Self::Priority => "priority",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persona that matched the request, with the terms that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersonaMatch {
    pub persona_id: String,
    pub category: Category,
    pub terms: Vec<String>,
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub primary: String,
    /// Other members of the coordination set, best-ranked first. Empty
    /// unless `coordinated`.
    pub secondary: Vec<String>,
    pub coordinated: bool,
    pub reason: SelectionReason,
    /// Every persona that matched, in rule-table order, including ones
    /// that were narrowed away.
    pub matches: Vec<PersonaMatch>,
    /// Project-level cues found in the request.
    pub cues: Vec<String>,
}

impl Selection {
    /// Selected personas, primary first.
    pub fn personas(&self) -> Vec<&str> {
        std::iter::once(self.primary.as_str())
            .chain(self.secondary.iter().map(String::as_str))
            .collect()
    }

    pub fn is_fallback(&self) -> bool {
        self.reason == SelectionReason::Fallback
    }
}

// ---------------------------------------------------------------------------
// ExpertSelector
// ---------------------------------------------------------------------------

/// Stateless keyword router from request text to persona ids.
///
/// Built once at startup and read-only afterwards; share it between
/// sessions behind an `Arc`.
#[derive(Debug)]
pub struct ExpertSelector {
    table: RuleTable,
    terms: TermMatcher,
    cues: TermMatcher,
    config: SelectorConfig,
}

impl ExpertSelector {
    /// Compile the rule table.
    ///
    /// Fails if the default persona is not in the table.
    pub fn new(table: RuleTable, config: SelectorConfig) -> Result<Self> {
        if !table.contains(&config.default_persona) {
            return Err(KernelError::UnknownPersona {
                persona_id: config.default_persona.clone(),
            });
        }

        let terms = TermMatcher::new(
            table
                .iter()
                .enumerate()
                .flat_map(|(idx, rule)| rule.trigger_terms.iter().map(move |t| (idx, t.as_str()))),
            config.match_mode,
        )?;
        let cues = TermMatcher::new(
            config.coordination_cues.iter().enumerate().map(|(i, c)| (i, c.as_str())),
            config.match_mode,
        )?;

        tracing::info!(
            personas = table.len(),
            terms = terms.len(),
            default_persona = %config.default_persona,
            mode = ?config.match_mode,
            "expert selector ready"
        );

        Ok(Self {
            table,
            terms,
            cues,
            config,
        })
    }

    /// Route `request` and record the outcome in `ctx`.
    pub fn select(&self, request: &str, ctx: &mut ConversationContext) -> Result<Selection> {
        let selection = self.evaluate(request, ctx.history())?;
        self.commit(ctx, request, &selection);
        Ok(selection)
    }

    /// Record an evaluated selection in `ctx`.
    ///
    /// Lets callers persist a selection from [`evaluate`](Self::evaluate)
    /// first and only advance the context once that succeeded.
    pub fn commit(&self, ctx: &mut ConversationContext, request: &str, selection: &Selection) {
        ctx.record(HistoryEntry {
            request: request.to_owned(),
            personas: selection.personas().into_iter().map(str::to_owned).collect(),
        });

        tracing::debug!(
            session = %ctx.session_id(),
            primary = %selection.primary,
            secondary = ?selection.secondary,
            reason = ?selection.reason,
            "request routed"
        );
    }

    /// Route `request` against `history` without recording anything.
    pub fn evaluate(&self, request: &str, history: &[HistoryEntry]) -> Result<Selection> {
        if request.trim().is_empty() {
            return Err(KernelError::InvalidInput {
                reason: "request text is empty".into(),
            });
        }

        let lowered = request.to_lowercase();
        let matches = self.collect_matches(&lowered);
        let cues: Vec<String> = {
            let mut found: Vec<String> = Vec::new();
            for hit in self.cues.find_all(&lowered) {
                let cue = self.cues.term(hit.term);
                if !found.iter().any(|c| c == cue) {
                    found.push(cue.to_owned());
                }
            }
            found
        };

        if matches.is_empty() {
            tracing::debug!(request = %request, "no trigger term matched, using default persona");
            return Ok(Selection {
                primary: self.config.default_persona.clone(),
                secondary: Vec::new(),
                coordinated: false,
                reason: SelectionReason::Fallback,
                matches,
                cues,
            });
        }

        let (primary, reason) = self.choose_primary(&matches, history);
        let coordinated = matches.len() >= 2 && !cues.is_empty();

        let secondary = if coordinated {
            let mut rest: Vec<&PersonaMatch> =
                matches.iter().filter(|m| m.persona_id != primary).collect();
            rest.sort_by_key(|m| self.rank(m));
            rest.into_iter().map(|m| m.persona_id.clone()).collect()
        } else {
            Vec::new()
        };

        Ok(Selection {
            primary,
            secondary,
            coordinated,
            reason,
            matches,
            cues,
        })
    }

    /// Rebuild a session context from stored history, in call order.
    ///
    /// Every persona named in the history must exist in the rule table.
    pub fn resume(
        &self,
        session_id: impl Into<String>,
        history: impl IntoIterator<Item = HistoryEntry>,
    ) -> Result<ConversationContext> {
        let mut ctx = ConversationContext::new(session_id);
        for entry in history {
            if entry.personas.is_empty() {
                return Err(KernelError::InvalidInput {
                    reason: format!("history entry for `{}` has no personas", entry.request),
                });
            }
            if let Some(unknown) = entry.personas.iter().find(|p| !self.table.contains(p)) {
                return Err(KernelError::UnknownPersona {
                    persona_id: unknown.clone(),
                });
            }
            ctx.record(entry);
        }
        Ok(ctx)
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    // -- Private helpers ----------------------------------------------------

    /// Group term hits by persona, in rule-table order.
    fn collect_matches(&self, lowered: &str) -> Vec<PersonaMatch> {
        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for hit in self.terms.find_all(lowered) {
            let terms = grouped.entry(hit.owner).or_default();
            let term = self.terms.term(hit.term);
            if !terms.iter().any(|t| t == term) {
                terms.push(term.to_owned());
            }
        }

        grouped
            .into_iter()
            .map(|(idx, terms)| {
                let rule = self.table.rule_at(idx);
                PersonaMatch {
                    persona_id: rule.persona_id.clone(),
                    category: rule.category,
                    terms,
                }
            })
            .collect()
    }

    fn choose_primary(
        &self,
        matches: &[PersonaMatch],
        history: &[HistoryEntry],
    ) -> (String, SelectionReason) {
        if let [only] = matches {
            return (only.persona_id.clone(), SelectionReason::SingleMatch);
        }

        let recent_categories = history
            .iter()
            .rev()
            .filter_map(|entry| entry.primary())
            .filter_map(|persona| self.table.get(persona))
            .map(|rule| rule.category);

        for category in recent_categories {
            let continued = matches
                .iter()
                .filter(|m| m.category == category)
                .min_by_key(|m| self.rank(m));
            if let Some(m) = continued {
                return (m.persona_id.clone(), SelectionReason::Continuity);
            }
        }

        let best = matches
            .iter()
            .min_by_key(|m| self.rank(m))
            .map(|m| m.persona_id.clone())
            .unwrap_or_else(|| self.config.default_persona.clone());
        (best, SelectionReason::Priority)
    }

    /// Sort key: category priority, then declaration order.
    fn rank(&self, m: &PersonaMatch) -> (usize, usize) {
        (
            self.config.priority.rank(m.category),
            self.table.position(&m.persona_id).unwrap_or(usize::MAX),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::PersonaRule;

    fn selector() -> ExpertSelector {
        let table = RuleTable::from_rules([
            PersonaRule::new(
                "backend-architect",
                "Architect",
                Category::Architecture,
                ["microservices"],
            ),
            PersonaRule::new("python-expert", "Python", Category::Backend, ["python", "django"]),
            PersonaRule::new("react-expert", "React", Category::Frontend, ["react", "hooks"]),
            PersonaRule::new("vue-expert", "Vue", Category::Frontend, ["vue"]),
            PersonaRule::new("postgres-expert", "Postgres", Category::Database, ["postgres"]),
            PersonaRule::new("frontend-design", "Design", Category::Frontend, ["ui design"]),
        ])
        .unwrap();
        ExpertSelector::new(table, SelectorConfig::default()).unwrap()
    }

    #[test]
    fn single_match_is_primary() {
        let s = selector();
        let mut ctx = ConversationContext::new("t");
        let sel = s.select("Create a React component", &mut ctx).unwrap();
        assert_eq!(sel.primary, "react-expert");
        assert_eq!(sel.reason, SelectionReason::SingleMatch);
        assert!(sel.secondary.is_empty());
        assert_eq!(sel.matches[0].terms, vec!["react"]);
    }

    #[test]
    fn empty_request_is_invalid() {
        let s = selector();
        let mut ctx = ConversationContext::new("t");
        assert!(matches!(
            s.select("", &mut ctx),
            Err(KernelError::InvalidInput { .. })
        ));
        assert!(matches!(
            s.select("   \n", &mut ctx),
            Err(KernelError::InvalidInput { .. })
        ));
        assert!(ctx.history().is_empty());
    }

    #[test]
    fn no_match_falls_back_to_default() {
        let s = selector();
        let mut ctx = ConversationContext::new("t");
        let sel = s.select("asdkjfh qwoeiru", &mut ctx).unwrap();
        assert_eq!(sel.primary, DEFAULT_PERSONA);
        assert!(sel.secondary.is_empty());
        assert!(sel.is_fallback());
        assert_eq!(ctx.active_persona(), Some(DEFAULT_PERSONA));
    }

    #[test]
    fn priority_breaks_ties_without_history() {
        let s = selector();
        let sel = s.evaluate("react frontend talking to a python api", &[]).unwrap();
        assert_eq!(sel.primary, "python-expert");
        assert_eq!(sel.reason, SelectionReason::Priority);
        assert!(!sel.coordinated);
        assert!(sel.secondary.is_empty());
        assert_eq!(sel.matches.len(), 2);
    }

    #[test]
    fn continuity_prefers_recent_category() {
        let s = selector();
        let mut ctx = ConversationContext::new("t");
        s.select("vue router question", &mut ctx).unwrap();

        let sel = s.select("react or python for this?", &mut ctx).unwrap();
        assert_eq!(sel.primary, "react-expert");
        assert_eq!(sel.reason, SelectionReason::Continuity);
    }

    #[test]
    fn continuity_skips_categories_not_matched() {
        let s = selector();
        let mut ctx = ConversationContext::new("t");
        s.select("python script", &mut ctx).unwrap();
        s.select("postgres index", &mut ctx).unwrap();

        // Most recent category is database, which does not match; backend does.
        let sel = s.select("react and python", &mut ctx).unwrap();
        assert_eq!(sel.primary, "python-expert");
        assert_eq!(sel.reason, SelectionReason::Continuity);
    }

    #[test]
    fn project_cue_keeps_coordination_set() {
        let s = selector();
        let sel = s
            .evaluate("Build a full-stack app with React and Python", &[])
            .unwrap();
        assert!(sel.coordinated);
        assert_eq!(sel.primary, "python-expert");
        assert_eq!(sel.secondary, vec!["react-expert"]);
        assert_eq!(sel.cues, vec!["full-stack"]);
    }

    #[test]
    fn cue_with_single_match_does_not_coordinate() {
        let s = selector();
        let sel = s.evaluate("a complete react rewrite", &[]).unwrap();
        assert!(!sel.coordinated);
        assert_eq!(sel.personas(), vec!["react-expert"]);
    }

    #[test]
    fn unknown_default_persona_is_rejected() {
        let table = RuleTable::from_rules([PersonaRule::new(
            "react-expert",
            "React",
            Category::Frontend,
            ["react"],
        )])
        .unwrap();
        let err = ExpertSelector::new(table, SelectorConfig::default()).unwrap_err();
        assert!(matches!(err, KernelError::UnknownPersona { .. }));
    }

    #[test]
    fn resume_rejects_unknown_personas() {
        let s = selector();
        let err = s
            .resume(
                "t",
                [HistoryEntry {
                    request: "old".into(),
                    personas: vec!["cobol-expert".into()],
                }],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            KernelError::UnknownPersona { persona_id } if persona_id == "cobol-expert"
        ));
    }

    #[test]
    fn resume_restores_active_persona() {
        let s = selector();
        let ctx = s
            .resume(
                "t",
                [
                    HistoryEntry {
                        request: "python".into(),
                        personas: vec!["python-expert".into()],
                    },
                    HistoryEntry {
                        request: "vue".into(),
                        personas: vec!["vue-expert".into()],
                    },
                ],
            )
            .unwrap();
        assert_eq!(ctx.active_persona(), Some("vue-expert"));
        assert_eq!(ctx.history().len(), 2);
    }

    #[test]
    fn repeated_cue_is_reported_once() {
        let s = selector();
        let selection = s
            .evaluate("a platform, complete platform with react and python", &[])
            .unwrap();
        assert_eq!(selection.cues, vec!["platform", "complete"]);
        assert!(selection.coordinated);
    }

    #[test]
    fn evaluate_leaves_context_until_commit() {
        let s = selector();
        let mut ctx = ConversationContext::new("t");
        let selection = s.evaluate("react hooks", ctx.history()).unwrap();
        assert!(ctx.history().is_empty());
        assert_eq!(ctx.active_persona(), None);

        s.commit(&mut ctx, "react hooks", &selection);
        assert_eq!(ctx.history().len(), 1);
        assert_eq!(ctx.active_persona(), Some("react-expert"));
    }
}
