//! # Lotline Analyst
//!
//! The orchestration layer between the deterministic dataset pipeline
//! and the chat backend. Given a question and a conversation history,
//! it prepares the dataset (memoized on content digest), packs the
//! payload, assembles the conversation context, and completes it
//! through the configured gateway.
//!
//! Nothing here talks to the network directly; that stays behind the
//! `ChatGateway` trait.

pub mod analyst;
pub mod context;

pub use analyst::{Analyst, Answer, AskScope, PreparedDataset};
pub use context::{
    estimate_message_tokens, estimate_messages_tokens, estimate_tokens, BuiltContext,
    ContextBuilder, ContextStats, DEFAULT_HISTORY_LIMIT,
};
