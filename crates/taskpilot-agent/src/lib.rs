//! `taskpilot-agent` — the stateless, multilingual chat agent.
//!
//! # Overview
//!
//! One turn maps a natural-language utterance onto at most one mutation of
//! the acting user's task store:
//!
//! 1. resolve (or lazily create) the conversation and persist the user turn
//! 2. build the prompt: system text + tool catalogue + recent-task
//!    projection + the recent message window
//! 3. one chat-completion call against an OpenAI-compatible endpoint
//! 4. scan the reply for a single JSON action directive; dispatch it
//!    through the [`tools::ToolRegistry`] when one names a registered tool
//! 5. run the language post-hook (classify, translate-on-mismatch)
//! 6. persist the assistant turn and respond
//!
//! The [`agent::ChatAgent`] is a fresh value per turn; everything shared
//! between requests lives behind the injected stores and the LLM client.

pub mod agent;
pub mod error;
pub mod extract;
pub mod language;
pub mod llm;
pub mod openai;
pub mod prompt;
pub mod service;
pub mod tools;

pub use agent::{ChatAgent, ChatOutcome, ChatTurn};
pub use error::AgentError;
pub use language::{Language, LanguagePipeline};
pub use llm::{ChatMessage, LlmClient, LlmError, LlmRequest, Role};
pub use openai::OpenAiClient;
pub use service::{Assistant, ConversationSummary, MessageView};
pub use tools::{ToolFailure, ToolOutcome, ToolRegistry};
