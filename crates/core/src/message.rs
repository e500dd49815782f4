//! Chat message and history domain types.
//!
//! A `ChatMessage` is exactly the `{role, content}` turn shape the chat
//! backends accept, so the gateway serializes these directly onto the
//! wire. `History` is the running transcript a session owns; the context
//! builder only ever reads a bounded suffix of it.

use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The model
    Assistant,
    /// Instructions and data context
    System,
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// An ordered transcript of user and assistant turns.
///
/// The caller owns it and decides when turns are appended; nothing in
/// the pipeline mutates it. Oldest turn first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    turns: Vec<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.turns.push(message);
    }

    /// Record one completed exchange.
    pub fn push_exchange(&mut self, question: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(ChatMessage::user(question));
        self.turns.push(ChatMessage::assistant(answer));
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    /// The most recent `limit` turns, oldest first. The whole transcript
    /// when it is shorter than `limit`.
    pub fn recent(&self, limit: usize) -> &[ChatMessage] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
