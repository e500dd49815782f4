//! Conversation context assembly.
//!
//! Builds the message list for one completion call from three layers:
//!
//! 1. **System**: the analyst instruction followed by the data payload,
//!    never trimmed
//! 2. **History**: the most recent conversation turns, oldest first,
//!    capped at the configured window
//! 3. **Question**: the current user message, always last
//!
//! Assembly is deterministic: identical inputs always produce an
//! identical message list. Token counts here are estimates for logging
//! and display, not enforcement.

use lotline_core::error::ContextError;
use lotline_core::message::{ChatMessage, History};
use lotline_dataset::Payload;
use serde::{Deserialize, Serialize};

/// Trailing turns carried per request when nothing else is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

/// Builds the message list for a completion call. Stateless; create one
/// and reuse it.
pub struct ContextBuilder {
    history_limit: usize,
}

/// An assembled conversation, ready for the gateway.
#[derive(Debug, Clone)]
pub struct BuiltContext {
    /// System message first, question last.
    pub messages: Vec<ChatMessage>,
    /// What went into the assembly.
    pub stats: ContextStats,
}

/// Assembly statistics for logging and status displays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStats {
    /// History turns that made it into the window.
    pub history_kept: usize,
    /// History turns available before capping.
    pub history_total: usize,
    /// Dataset rows inside the payload block.
    pub payload_rows: usize,
    /// Rough size of the whole message list.
    pub estimated_tokens: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl ContextBuilder {
    pub fn new(history_limit: usize) -> Self {
        Self { history_limit }
    }

    /// Assemble the message list for one question.
    ///
    /// Refuses to build a hollow prompt: a missing instruction, an empty
    /// table, or an empty question all fail with `DataUnavailable`. A
    /// payload whose year filter matched nothing still builds; the model
    /// is expected to say so rather than invent numbers.
    pub fn build(
        &self,
        instruction: &str,
        payload: &Payload,
        history: &History,
        question: &str,
    ) -> Result<BuiltContext, ContextError> {
        if instruction.trim().is_empty() {
            return Err(ContextError::DataUnavailable(
                "instruction text is empty".into(),
            ));
        }
        if payload.rows_total == 0 {
            return Err(ContextError::DataUnavailable("dataset has no rows".into()));
        }
        if payload.text.trim().is_empty() {
            return Err(ContextError::DataUnavailable("data payload is empty".into()));
        }
        if question.trim().is_empty() {
            return Err(ContextError::DataUnavailable("question is empty".into()));
        }

        let system = format!("{}\n\n{}", instruction.trim_end(), payload.prompt_block());

        let window = history.recent(self.history_limit);
        let mut messages = Vec::with_capacity(window.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(window.iter().cloned());
        messages.push(ChatMessage::user(question));

        let stats = ContextStats {
            history_kept: window.len(),
            history_total: history.len(),
            payload_rows: payload.rows_included,
            estimated_tokens: estimate_messages_tokens(&messages),
        };

        Ok(BuiltContext { messages, stats })
    }
}

// --- Token estimation ---

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters, rounding up. Accurate within
/// ~10% for BPE tokenizers on western-language text.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.len() + 3) / 4
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens for role name, delimiters, and
/// formatting markers in the API wire format.
pub fn estimate_message_tokens(message: &ChatMessage) -> usize {
    4 + estimate_tokens(&message.content)
}

/// Estimate tokens for a whole message list.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
