//! Complexity scoring and task decomposition.
//!
//! A request's complexity is estimated from four families of indicator
//! words. The score picks an [`OrchestrationPattern`], and
//! [`plan_tasks`] turns a [`Selection`] into an ordered list of subtasks
//! for that pattern.

use regex::Regex;
use serde::Serialize;

use crate::error::{KernelError, Result};
use crate::rules::{Category, RuleTable};
use crate::selector::Selection;

const MULTI_DOMAIN: &str = r"\b(react|python|database|docker|test)\b";
const TECHNICAL: &str = r"\b(api|database|frontend|backend|deploy)\b";
const ACTION: &str = r"\b(build|create|implement|design|develop)\b";
const SCOPE: &str = r"\b(system|platform|application|solution)\b";

// ---------------------------------------------------------------------------
// Complexity
// ---------------------------------------------------------------------------

/// How multiple personas should cooperate on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationPattern {
    /// Hand the request to the primary persona.
    Handoff,
    /// Personas work one after another.
    Sequential,
    /// Personas work in parallel and the primary aggregates.
    Concurrent,
    /// Plan, build, then test.
    Hierarchical,
}

impl OrchestrationPattern {
    /// Pattern for a complexity score.
    pub fn for_score(score: f32) -> Self {
        if score >= 3.0 {
            Self::Hierarchical
        } else if score >= 2.0 {
            Self::Concurrent
        } else if score >= 1.0 {
            Self::Sequential
        } else {
            Self::Handoff
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handoff => "handoff",
            Self::Sequential => "sequential",
            Self::Concurrent => "concurrent",
            Self::Hierarchical => "hierarchical",
        }
    }
}

/// Indicator counts behind a complexity score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Indicators {
    pub multi_domain: usize,
    pub technical: usize,
    pub action: usize,
    pub scope: usize,
}

impl Indicators {
    fn total(&self) -> usize {
        self.multi_domain + self.technical + self.action + self.scope
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComplexityReport {
    /// Mean indicator count across the four families.
    pub score: f32,
    pub indicators: Indicators,
    pub pattern: OrchestrationPattern,
}

/// Compiled indicator expressions.
#[derive(Debug, Clone)]
pub struct ComplexityAnalyzer {
    multi_domain: Regex,
    technical: Regex,
    action: Regex,
    scope: Regex,
}

impl ComplexityAnalyzer {
    pub fn new() -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| KernelError::MatcherBuild {
                reason: format!("indicator `{pattern}`: {e}"),
            })
        };
        Ok(Self {
            multi_domain: compile(MULTI_DOMAIN)?,
            technical: compile(TECHNICAL)?,
            action: compile(ACTION)?,
            scope: compile(SCOPE)?,
        })
    }

    pub fn analyze(&self, request: &str) -> ComplexityReport {
        let lowered = request.to_lowercase();
        let indicators = Indicators {
            multi_domain: self.multi_domain.find_iter(&lowered).count(),
            technical: self.technical.find_iter(&lowered).count(),
            action: self.action.find_iter(&lowered).count(),
            scope: self.scope.find_iter(&lowered).count(),
        };
        let score = indicators.total() as f32 / 4.0;
        let pattern = OrchestrationPattern::for_score(score);
        tracing::debug!(score, pattern = pattern.as_str(), "complexity analyzed");
        ComplexityReport {
            score,
            indicators,
            pattern,
        }
    }
}

// ---------------------------------------------------------------------------
// Task plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskKind {
    Planning,
    Development,
    Testing,
    Parallel,
    Aggregation,
    Sequential,
    Handoff,
}

impl SubtaskKind {
    fn estimated_minutes(self) -> u32 {
        match self {
            Self::Planning | Self::Sequential => 20,
            Self::Development => 30,
            Self::Testing => 25,
            Self::Parallel | Self::Handoff => 15,
            Self::Aggregation => 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtask {
    pub id: String,
    pub level: u8,
    pub kind: SubtaskKind,
    pub persona: String,
    pub description: String,
    pub depends_on: Vec<String>,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskPlan {
    pub pattern: OrchestrationPattern,
    pub subtasks: Vec<Subtask>,
    pub estimated_minutes: u32,
}

/// Accumulates subtasks and hands out `<pattern>_<n>` ids.
struct PlanBuilder {
    pattern: OrchestrationPattern,
    subtasks: Vec<Subtask>,
}

impl PlanBuilder {
    fn push(
        &mut self,
        level: u8,
        kind: SubtaskKind,
        persona: &str,
        description: String,
        depends_on: Vec<String>,
    ) -> String {
        let id = format!("{}_{}", self.pattern.as_str(), self.subtasks.len() + 1);
        self.subtasks.push(Subtask {
            id: id.clone(),
            level,
            kind,
            persona: persona.to_owned(),
            description,
            depends_on,
            estimated_minutes: kind.estimated_minutes(),
        });
        id
    }

    fn finish(self) -> TaskPlan {
        let estimated_minutes = self.subtasks.iter().map(|s| s.estimated_minutes).sum();
        TaskPlan {
            pattern: self.pattern,
            subtasks: self.subtasks,
            estimated_minutes,
        }
    }
}

/// Decompose a selection into subtasks for `pattern`.
pub fn plan_tasks(
    selection: &Selection,
    table: &RuleTable,
    pattern: OrchestrationPattern,
) -> TaskPlan {
    let personas = selection.personas();
    let mut plan = PlanBuilder {
        pattern,
        subtasks: Vec::new(),
    };

    match pattern {
        OrchestrationPattern::Handoff => {
            plan.push(
                1,
                SubtaskKind::Handoff,
                &selection.primary,
                format!("Direct handoff to {}", selection.primary),
                Vec::new(),
            );
        }
        OrchestrationPattern::Sequential => {
            let (architects, others): (Vec<&str>, Vec<&str>) = personas
                .iter()
                .copied()
                .partition(|p| category_of(table, p) == Some(Category::Architecture));
            let mut previous: Option<String> = None;
            for persona in architects.into_iter().chain(others) {
                let id = plan.push(
                    1,
                    SubtaskKind::Sequential,
                    persona,
                    format!("Sequential step by {persona}"),
                    previous.take().into_iter().collect(),
                );
                previous = Some(id);
            }
        }
        OrchestrationPattern::Concurrent => {
            let parallel: Vec<String> = personas
                .iter()
                .map(|persona| {
                    plan.push(
                        1,
                        SubtaskKind::Parallel,
                        persona,
                        format!("Parallel analysis by {persona}"),
                        Vec::new(),
                    )
                })
                .collect();
            plan.push(
                2,
                SubtaskKind::Aggregation,
                &selection.primary,
                "Aggregate results from the parallel analyses".to_owned(),
                parallel,
            );
        }
        OrchestrationPattern::Hierarchical => {
            let planning: Vec<String> = personas
                .iter()
                .filter(|p| category_of(table, p) == Some(Category::Architecture))
                .map(|persona| {
                    plan.push(
                        1,
                        SubtaskKind::Planning,
                        persona,
                        "System architecture and technical planning".to_owned(),
                        Vec::new(),
                    )
                })
                .collect();
            let development: Vec<String> = personas
                .iter()
                .filter(|p| {
                    !matches!(
                        category_of(table, p),
                        Some(Category::Architecture | Category::Testing)
                    )
                })
                .map(|persona| {
                    plan.push(
                        2,
                        SubtaskKind::Development,
                        persona,
                        format!("Core development by {persona}"),
                        planning.clone(),
                    )
                })
                .collect();
            let testing_deps = if development.is_empty() {
                planning
            } else {
                development
            };
            for persona in personas
                .iter()
                .filter(|p| category_of(table, p) == Some(Category::Testing))
            {
                plan.push(
                    3,
                    SubtaskKind::Testing,
                    persona,
                    format!("Integration testing and quality assurance by {persona}"),
                    testing_deps.clone(),
                );
            }
        }
    }

    plan.finish()
}

fn category_of(table: &RuleTable, persona: &str) -> Option<Category> {
    table.get(persona).map(|r| r.category)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
