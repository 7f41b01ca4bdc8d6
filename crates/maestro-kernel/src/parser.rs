//! Markdown rule-table parser.
//!
//! Rule files are ordinary Markdown. Headings name the [`Category`] of the
//! rules beneath them, and each rule is a bullet with a bold label:
//!
//! ```text
//! ## Frontend
//!
//! - **React**: react, hooks, jsx → react-expert
//! - **Vue**: vue, vuex → vue-expert
//! ```
//!
//! The left side of `→` (after the colon) is a comma-separated list of
//! trigger terms; the right side is the persona id. `->` is accepted as an
//! ASCII spelling of the arrow. Any other line, including bullets without a
//! bold `**Label**:` prefix, is treated as prose and skipped.
//!
//! Parsing is all-or-nothing: the first malformed rule aborts with
//! [`KernelError::RuleTableParse`] so a partial table is never used.

use std::path::Path;

use crate::error::{KernelError, Result};
use crate::rules::{Category, PersonaRule, RuleTable};

const ARROWS: [&str; 2] = ["→", "->"];

/// Parse a rule table from Markdown text.
pub fn parse_rule_table(content: &str) -> Result<RuleTable> {
    let mut section: Option<(usize, Category)> = None;
    let mut rules = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();

        if let Some((level, title)) = heading(line) {
            match Category::from_heading(title) {
                Some(category) => section = Some((level, category)),
                // A deeper, unrelated sub-heading keeps the enclosing section.
                None if section.is_some_and(|(l, _)| level <= l) => section = None,
                None => {}
            }
            continue;
        }

        let Some((label, body)) = rule_bullet(line) else {
            continue;
        };

        let Some((_, category)) = section else {
            return Err(KernelError::parse(
                line_no,
                format!("rule `{label}` is not under a category heading"),
            ));
        };

        rules.push(parse_rule(line_no, label, body, category)?);
    }

    let table = RuleTable::from_rules(rules)?;
    tracing::debug!(
        personas = table.len(),
        terms = table.term_count(),
        "rule table parsed"
    );
    Ok(table)
}

/// Read and parse a rule file from disk.
pub fn parse_rule_file(path: impl AsRef<Path>) -> Result<RuleTable> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| KernelError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %path.display(), "loading rule file");
    parse_rule_table(&content)
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// Recognise an ATX heading, returning its level and title.
fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim().trim_end_matches('#').trim()))
}

/// Recognise a `- **Label**: ...` bullet, returning the label and the text
/// after the colon.
///
/// Both `**Label**:` and `**Label:**` spellings are accepted.
fn rule_bullet(line: &str) -> Option<(&str, &str)> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?
        .trim_start();
    let rest = rest.strip_prefix("**")?;
    let close = rest.find("**")?;
    let label = &rest[..close];
    let after = &rest[close + 2..];

    if let Some(label) = label.strip_suffix(':') {
        return Some((label.trim(), after));
    }
    let body = after.trim_start().strip_prefix(':')?;
    Some((label.trim(), body))
}

// ---------------------------------------------------------------------------
// Rule body
// ---------------------------------------------------------------------------

fn parse_rule(line_no: usize, label: &str, body: &str, category: Category) -> Result<PersonaRule> {
    let (terms, persona) = ARROWS
        .iter()
        .find_map(|arrow| body.rsplit_once(*arrow))
        .ok_or_else(|| {
            KernelError::parse(line_no, format!("rule `{label}` is missing the `→` separator"))
        })?;

    let persona_id = strip_code(persona.trim());
    if persona_id.is_empty() {
        return Err(KernelError::parse(
            line_no,
            format!("rule `{label}` has an empty persona id"),
        ));
    }
    if persona_id.chars().any(char::is_whitespace) {
        return Err(KernelError::parse(
            line_no,
            format!("persona id `{persona_id}` contains whitespace"),
        ));
    }

    let terms: Vec<&str> = terms
        .split(',')
        .map(|t| strip_code(t.trim()))
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return Err(KernelError::parse(
            line_no,
            format!("rule `{label}` has no trigger terms"),
        ));
    }

    Ok(PersonaRule::new(persona_id, label, category, terms))
}

/// Drop surrounding backticks or quotes.
fn strip_code(s: &str) -> &str {
    s.trim_matches(|c| c == '`' || c == '"' || c == '\'').trim()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
