use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A single message in a chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

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
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A bounded chat-completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Common interface for the chat-completion transport.
///
/// Injected into the agent at construction so tests can substitute a
/// scripted fake. The client never retries; fallback behaviour belongs to
/// the agent.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one request, wait for the full assistant text.
    async fn complete(&self, req: &LlmRequest) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Transport failure, timeout, 5xx, or rate limiting. Retryable.
    #[error("LLM unavailable: {0}")]
    Unavailable(String),

    /// The response arrived but did not carry the expected assistant text.
    #[error("LLM response malformed: {0}")]
    Malformed(String),
}
