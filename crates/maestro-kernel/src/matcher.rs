//! Multi-term matching over request text.
//!
//! All trigger terms are compiled into a single [`aho_corasick`] automaton so
//! a request is scanned once regardless of how many personas exist. Matches
//! are reported with overlaps (so "react native" can select both the
//! `react` and `react native` owners) and then filtered by [`MatchMode`].

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// How a trigger term must appear in the request to count as a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMode {
    /// The term must not be glued to letters or digits on either side, so
    /// `react` does not match inside `reactive`.
    #[default]
    WholeWord,
    /// Any occurrence counts.
    Substring,
}

/// One accepted occurrence of a term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermHit {
    /// Caller-supplied owner of the term (a rule index, a cue index, ...).
    pub owner: usize,
    /// Index of the term in registration order.
    pub term: usize,
    pub start: usize,
    pub end: usize,
}

/// Compiled set of lowercase terms, each tagged with an owner.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    automaton: Option<AhoCorasick>,
    terms: Vec<String>,
    owners: Vec<usize>,
    mode: MatchMode,
}

impl TermMatcher {
    /// Compile `(owner, term)` pairs. Terms are lowercased; empty terms are
    /// dropped.
    pub fn new<I, S>(entries: I, mode: MatchMode) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, S)>,
        S: AsRef<str>,
    {
        let mut terms = Vec::new();
        let mut owners = Vec::new();
        for (owner, term) in entries {
            let term = term.as_ref().trim().to_lowercase();
            if term.is_empty() {
                continue;
            }
            terms.push(term);
            owners.push(owner);
        }

        let automaton = if terms.is_empty() {
            None
        } else {
            let ac = AhoCorasick::new(&terms).map_err(|e| KernelError::MatcherBuild {
                reason: e.to_string(),
            })?;
            tracing::trace!(count = terms.len(), "term automaton built");
            Some(ac)
        };

        Ok(Self {
            automaton,
            terms,
            owners,
            mode,
        })
    }

    /// Find every accepted occurrence in already-lowercased text.
    pub fn find_all(&self, lowered: &str) -> Vec<TermHit> {
        let Some(ac) = self.automaton.as_ref() else {
            return Vec::new();
        };

        ac.find_overlapping_iter(lowered)
            .filter_map(|mat| {
                let term = mat.pattern().as_usize();
                let hit = TermHit {
                    owner: self.owners[term],
                    term,
                    start: mat.start(),
                    end: mat.end(),
                };
                self.accepts(lowered, &hit).then_some(hit)
            })
            .collect()
    }

    /// Whether any term occurs in already-lowercased text.
    pub fn is_match(&self, lowered: &str) -> bool {
        !self.find_all(lowered).is_empty()
    }

    pub fn term(&self, idx: usize) -> &str {
        &self.terms[idx]
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    fn accepts(&self, text: &str, hit: &TermHit) -> bool {
        match self.mode {
            MatchMode::Substring => true,
            MatchMode::WholeWord => {
                let term = &self.terms[hit.term];
                let left_ok = !term.starts_with(is_word_char)
                    || !text[..hit.start].ends_with(is_word_char);
                let right_ok = !term.ends_with(is_word_char)
                    || !text[hit.end..].starts_with(is_word_char);
                left_ok && right_ok
            }
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
