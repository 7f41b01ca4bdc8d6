//! Per-session conversation state.
//!
//! The "currently active expert" lives here, in a value owned by the caller,
//! rather than in the selector. Each session holds its own
//! [`ConversationContext`]; independent sessions never share one.

use serde::{Deserialize, Serialize};

/// One processed request and the personas it was routed to, primary first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub request: String,
    pub personas: Vec<String>,
}

impl HistoryEntry {
    pub fn primary(&self) -> Option<&str> {
        self.personas.first().map(String::as_str)
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState<'a> {
    /// No request has been routed yet.
    NoActivePersona,
    /// The last request selected this primary persona.
    PersonaActive(&'a str),
}

/// Conversation context for a single session.
///
/// Mutated only by [`crate::ExpertSelector::select`], which appends exactly
/// one history entry per request and keeps `active_persona` pointing at the
/// primary of the newest entry. Rebuilding a context from stored history
/// goes through [`crate::ExpertSelector::resume`], which checks every
/// persona against the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationContext {
    session_id: String,
    active_persona: Option<String>,
    history: Vec<HistoryEntry>,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            active_persona: None,
            history: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn active_persona(&self) -> Option<&str> {
        self.active_persona.as_deref()
    }

    /// Entries in call order.
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    pub fn state(&self) -> SessionState<'_> {
        match self.active_persona.as_deref() {
            Some(persona) => SessionState::PersonaActive(persona),
            None => SessionState::NoActivePersona,
        }
    }

    /// Append an entry and activate its primary persona.
    pub(crate) fn record(&mut self, entry: HistoryEntry) {
        if let Some(primary) = entry.primary() {
            self.active_persona = Some(primary.to_owned());
        }
        self.history.push(entry);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
