//! maestro kernel.
//!
//! Decides which expert persona should answer a request:
//!
//! - **[`rules`]** -- Persona rules, categories, and the immutable
//!   [`RuleTable`], including the table embedded in the binary.
//! - **[`parser`]** -- Markdown rule-file parser
//!   (`- **Label**: terms → persona-id`).
//! - **[`matcher`]** -- Single-pass multi-term matching via [`aho_corasick`]
//!   with whole-word or substring semantics.
//! - **[`selector`]** -- The [`ExpertSelector`]: matching, continuity and
//!   priority tie-breaks, default fallback, and coordination sets.
//! - **[`context`]** -- Per-session [`ConversationContext`] and history.
//! - **[`orchestration`]** -- Complexity scoring and task decomposition for
//!   multi-persona requests.
//! - **[`error`]** -- Unified kernel error types via [`thiserror`].
//!
//! The selector is `Send + Sync` and read-only after construction, so one
//! instance can serve any number of sessions concurrently.

pub mod context;
pub mod error;
pub mod matcher;
pub mod orchestration;
pub mod parser;
pub mod rules;
pub mod selector;

// Re-export the most commonly used types at the crate root for convenience.
pub use context::{ConversationContext, HistoryEntry, SessionState};
pub use error::{KernelError, Result};
pub use matcher::MatchMode;
pub use orchestration::{
    ComplexityAnalyzer, ComplexityReport, OrchestrationPattern, Subtask, SubtaskKind, TaskPlan,
    plan_tasks,
};
pub use parser::{parse_rule_file, parse_rule_table};
pub use rules::{BUILTIN_RULES, Category, CategoryPriority, PersonaRule, RuleTable};
pub use selector::{
    DEFAULT_COORDINATION_CUES, DEFAULT_PERSONA, ExpertSelector, PersonaMatch, Selection,
    SelectionReason, SelectorConfig,
};
