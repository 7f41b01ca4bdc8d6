//! Persona rule model.
//!
//! A [`RuleTable`] is the static, data-driven description of every persona
//! the selector can choose: its id, a display label, the [`Category`] it
//! belongs to, and the trigger terms that select it. The table is built once
//! at startup (usually by [`crate::parser`]) and never mutated afterwards.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};
use crate::parser;

/// The rule table shipped with maestro.
pub const BUILTIN_RULES: &str = include_str!("../rules/experts.md");

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Domain a persona belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Architecture,
    Backend,
    Frontend,
    Database,
    Devops,
    Security,
    Testing,
    Mobile,
    AiMl,
    Business,
}

impl Category {
    /// Every category, in the default priority order.
    pub const ALL: [Category; 10] = [
        Category::Architecture,
        Category::Backend,
        Category::Frontend,
        Category::Database,
        Category::Devops,
        Category::Security,
        Category::Testing,
        Category::Mobile,
        Category::AiMl,
        Category::Business,
    ];

    /// Stable snake_case name, as used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Architecture => "architecture",
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Database => "database",
            Self::Devops => "devops",
            Self::Security => "security",
            Self::Testing => "testing",
            Self::Mobile => "mobile",
            Self::AiMl => "ai_ml",
            Self::Business => "business",
        }
    }

    /// Map a Markdown heading such as `## Backend Architecture` or
    /// `### AI / ML Experts` to a category.
    ///
    /// Punctuation and whitespace are ignored and a trailing "expert(s)" is
    /// dropped before the lookup. Returns `None` for headings that do not
    /// name a category.
    pub fn from_heading(heading: &str) -> Option<Self> {
        let key: String = heading
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        let key = key
            .strip_suffix("experts")
            .or_else(|| key.strip_suffix("expert"))
            .unwrap_or(&key);
        Self::from_key(key)
    }

    fn from_key(key: &str) -> Option<Self> {
        let category = match key {
            "architecture" | "backendarchitecture" | "systemarchitecture" => Self::Architecture,
            "backend" | "backendlanguages" => Self::Backend,
            "frontend" => Self::Frontend,
            "database" | "databases" | "data" => Self::Database,
            "devops" | "infrastructure" => Self::Devops,
            "security" => Self::Security,
            "testing" | "qa" | "testingqa" => Self::Testing,
            "mobile" => Self::Mobile,
            "aiml" | "ai" | "machinelearning" => Self::AiMl,
            "business" | "product" | "businessproduct" => Self::Business,
            _ => return None,
        };
        Some(category)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_heading(s).ok_or_else(|| KernelError::InvalidInput {
            reason: format!("unknown category `{s}`"),
        })
    }
}

// ---------------------------------------------------------------------------
// CategoryPriority
// ---------------------------------------------------------------------------

/// Fixed tie-break order over categories. Lower rank wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryPriority {
    order: Vec<Category>,
}

impl CategoryPriority {
    /// Build a priority order from an explicit list.
    ///
    /// Every category must appear exactly once.
    pub fn from_order(order: Vec<Category>) -> Result<Self> {
        for category in Category::ALL {
            let seen = order.iter().filter(|c| **c == category).count();
            if seen != 1 {
                return Err(KernelError::InvalidPriority {
                    reason: format!("category `{category}` appears {seen} times, expected once"),
                });
            }
        }
        Ok(Self { order })
    }

    /// Rank of `category` (0 is highest priority).
    pub fn rank(&self, category: Category) -> usize {
        self.order
            .iter()
            .position(|c| *c == category)
            .unwrap_or(self.order.len())
    }

    pub fn as_slice(&self) -> &[Category] {
        &self.order
    }
}

impl Default for CategoryPriority {
    fn default() -> Self {
        Self {
            order: Category::ALL.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// PersonaRule
// ---------------------------------------------------------------------------

/// A single persona and the terms that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaRule {
    /// Identifier such as `react-expert`.
    pub persona_id: String,
    /// Display label taken from the bold prefix of the rule line.
    pub label: String,
    pub category: Category,
    /// Lowercased trigger terms, deduplicated, in declaration order.
    pub trigger_terms: Vec<String>,
}

impl PersonaRule {
    pub fn new(
        persona_id: impl Into<String>,
        label: impl Into<String>,
        category: Category,
        terms: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let mut rule = Self {
            persona_id: persona_id.into(),
            label: label.into(),
            category,
            trigger_terms: Vec::new(),
        };
        rule.add_terms(terms);
        rule
    }

    fn add_terms(&mut self, terms: impl IntoIterator<Item = impl AsRef<str>>) {
        for term in terms {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !self.trigger_terms.contains(&term) {
                self.trigger_terms.push(term);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RuleTable
// ---------------------------------------------------------------------------

/// Immutable collection of persona rules in declaration order.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<PersonaRule>,
    index: HashMap<String, usize>,
}

impl RuleTable {
    /// Build a table from rules.
    ///
    /// Rules that repeat a persona id are merged into the first occurrence:
    /// their trigger terms are appended and their category is ignored.
    pub fn from_rules(rules: impl IntoIterator<Item = PersonaRule>) -> Result<Self> {
        let mut table = Self::default();
        for rule in rules {
            table.insert(rule);
        }
        if table.rules.is_empty() {
            return Err(KernelError::EmptyRuleTable);
        }
        Ok(table)
    }

    /// Parse the rule table embedded in the binary.
    pub fn builtin() -> Result<Self> {
        parser::parse_rule_table(BUILTIN_RULES)
    }

    pub(crate) fn insert(&mut self, rule: PersonaRule) {
        match self.index.get(&rule.persona_id) {
            Some(&idx) => {
                let existing = &mut self.rules[idx];
                if existing.category != rule.category {
                    tracing::warn!(
                        persona = %rule.persona_id,
                        kept = %existing.category,
                        ignored = %rule.category,
                        "persona declared under two categories"
                    );
                }
                existing.add_terms(rule.trigger_terms);
            }
            None => {
                self.index.insert(rule.persona_id.clone(), self.rules.len());
                self.rules.push(rule);
            }
        }
    }

    pub fn get(&self, persona_id: &str) -> Option<&PersonaRule> {
        self.index.get(persona_id).map(|&idx| &self.rules[idx])
    }

    pub fn contains(&self, persona_id: &str) -> bool {
        self.index.contains_key(persona_id)
    }

    /// Declaration position of a persona, used as the final tie-break.
    pub fn position(&self, persona_id: &str) -> Option<usize> {
        self.index.get(persona_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PersonaRule> {
        self.rules.iter()
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &PersonaRule> {
        self.rules.iter().filter(move |r| r.category == category)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn rule_at(&self, idx: usize) -> &PersonaRule {
        &self.rules[idx]
    }

    /// Total number of trigger terms across all rules.
    pub fn term_count(&self) -> usize {
        self.rules.iter().map(|r| r.trigger_terms.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
