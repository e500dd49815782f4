//! ChatGateway trait, the abstraction over chat backends.
//!
//! A gateway knows how to send an assembled conversation to a chat model
//! and return the completed answer. The backend is an external
//! collaborator: everything behind this trait is network territory, and
//! everything in front of it is deterministic pipeline.
//!
//! Implementations: OpenAI-compatible endpoints, Azure OpenAI
//! deployments, and test doubles.

use crate::error::GatewayError;
use crate::message::ChatMessage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A fully assembled completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model or deployment to use (e.g., "gpt-4.1").
    pub model: String,

    /// The conversation: system context first, question last.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature. Kept low; this is an analyst, not a poet.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.3
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// A complete response from a chat backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The answer text, already trimmed.
    pub content: String,

    /// Which model actually responded (may differ from requested).
    pub model: String,

    /// Token usage statistics, when the backend reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The chat backend boundary.
///
/// The analyst calls `complete()` without knowing which backend is
/// wired in. Implementations must not mutate or reorder the messages
/// they are given.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// A human-readable name for this backend (e.g., "azure-openai").
    fn name(&self) -> &str;

    /// Send a request and get the complete answer.
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, GatewayError>;

    /// Health check: is the backend reachable and configured?
    async fn health_check(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }
}
