//! Kernel error types.
//!
//! Every public API in this crate surfaces failures through [`KernelError`].
//! Rule-table problems carry the 1-based line number of the offending
//! Markdown line so the file can be fixed without guessing.

use std::path::PathBuf;

/// Unified error type for the maestro kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // -- Selector errors ----------------------------------------------------
    /// The request text was empty or contained only whitespace.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    /// A persona id was referenced that does not exist in the rule table.
    #[error("unknown persona `{persona_id}`")]
    UnknownPersona { persona_id: String },

    /// The configured category priority order is not a permutation of all
    /// categories.
    #[error("invalid category priority: {reason}")]
    InvalidPriority { reason: String },

    // -- Rule table errors --------------------------------------------------
    /// A line of the Markdown rule table could not be parsed.
    #[error("rule table parse error at line {line}: {reason}")]
    RuleTableParse { line: usize, reason: String },

    /// The rule table parsed cleanly but contained no rules at all.
    #[error("rule table contains no persona rules")]
    EmptyRuleTable,

    /// Building the term automaton failed.
    #[error("matcher build error: {reason}")]
    MatcherBuild { reason: String },

    /// Reading a rule file from disk failed.
    #[error("failed to read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KernelError {
    /// Shorthand for a parse error at `line`.
    pub(crate) fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::RuleTableParse {
            line,
            reason: reason.into(),
        }
    }

    /// Whether this error came from a malformed rule table.
    pub fn is_rule_table_error(&self) -> bool {
        matches!(
            self,
            Self::RuleTableParse { .. } | Self::EmptyRuleTable | Self::Io { .. }
        )
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
