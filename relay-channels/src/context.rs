//! Conversation context buffer.
//!
//! Keeps a bounded window of conversation turns and renders it into the
//! single prompt string the text generator continues from. The persona lives
//! in its own pinned slot and is never evicted.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default window size: persona plus 18 turns.
pub const DEFAULT_CAPACITY: usize = 19;

/// Cue appended after the rendered history.
pub const ASSISTANT_CUE: &str = "Assistant: ";

/// Who produced a context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Fixed system instructions
    #[serde(rename = "system")]
    Persona,
    User,
    Assistant,
}

impl Role {
    /// Label used when flattening the window into a prompt.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Persona => "System",
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }

    /// Parse a prompt label back into a role.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "System" => Some(Self::Persona),
            "User" => Some(Self::User),
            "Assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A single turn in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub role: Role,
    pub content: String,
}

impl ContextEntry {
    pub fn persona(text: impl Into<String>) -> Self {
        Self {
            role: Role::Persona,
            content: text.into(),
        }
    }

    /// A user turn, prefixed with the speaker so several speakers stay
    /// distinguishable in the flattened prompt.
    pub fn user(from: &str, text: &str) -> Self {
        Self {
            role: Role::User,
            content: format!("{from}: {text}"),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// Bounded, insertion-ordered conversation history.
#[derive(Debug, Clone)]
pub struct ConversationWindow {
    persona: Option<ContextEntry>,
    turns: VecDeque<ContextEntry>,
    capacity: usize,
}

impl ConversationWindow {
    /// Create a window of [`DEFAULT_CAPACITY`] entries.
    ///
    /// A non-empty `persona` is pinned at the front; an empty one leaves the
    /// window without a persona slot.
    pub fn initialize(persona: &str) -> Self {
        Self::with_capacity(persona, DEFAULT_CAPACITY)
    }

    /// Create a window holding at most `capacity` entries, persona included.
    ///
    /// The capacity is raised so that at least one turn always fits.
    pub fn with_capacity(persona: &str, capacity: usize) -> Self {
        let persona = (!persona.is_empty()).then(|| ContextEntry::persona(persona));
        let capacity = capacity.max(usize::from(persona.is_some()) + 1);
        Self {
            persona,
            turns: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a turn, evicting the oldest turns if the window overflows.
    ///
    /// Persona entries are not turns; appending one is ignored.
    pub fn append(&mut self, entry: ContextEntry) {
        if entry.role == Role::Persona {
            tracing::warn!("Ignoring attempt to append a second persona entry");
            return;
        }

        self.turns.push_back(entry);

        let excess = self.turns.len().saturating_sub(self.turn_capacity());
        if excess > 0 {
            self.turns.drain(..excess);
        }
    }

    /// Render the window as `"<Label>: <content>\n"` lines followed by the
    /// assistant cue.
    pub fn serialize(&self) -> String {
        let mut prompt = String::new();

        for entry in self.entries() {
            prompt.push_str(entry.role.label());
            prompt.push_str(": ");
            prompt.push_str(&entry.content);
            prompt.push('\n');
        }

        prompt.push_str(ASSISTANT_CUE);
        prompt
    }

    /// Entries in window order, persona first.
    pub fn entries(&self) -> impl Iterator<Item = &ContextEntry> {
        self.persona.iter().chain(self.turns.iter())
    }

    pub fn len(&self) -> usize {
        usize::from(self.persona.is_some()) + self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_persona(&self) -> bool {
        self.persona.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn turn_capacity(&self) -> usize {
        self.capacity - usize::from(self.persona.is_some())
    }
}
