//! Upstream service facade.
//!
//! [`Assistant`] owns the shared collaborators and hands them to a fresh
//! [`ChatAgent`] for every turn. Its methods map 1:1 to the endpoints the
//! surrounding framing layer exposes; nothing here assumes HTTP.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use taskpilot_conversations::{ConversationError, ConversationStore, MessageRole};
use taskpilot_core::{Clock, TaskpilotConfig};
use taskpilot_store::TaskStore;

use crate::agent::{ChatAgent, ChatOutcome, ChatTurn, TurnLimits};
use crate::error::AgentError;
use crate::language::{Language, LanguagePipeline};
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;

/// Listing row for the conversation sidebar.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Transcript row served to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

pub struct Assistant {
    llm: Arc<dyn LlmClient>,
    tasks: Arc<TaskStore>,
    conversations: Arc<ConversationStore>,
    registry: Arc<ToolRegistry>,
    pipeline: Arc<LanguagePipeline>,
    clock: Arc<dyn Clock>,
    limits: TurnLimits,
    default_language: Language,
}

impl Assistant {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tasks: Arc<TaskStore>,
        conversations: Arc<ConversationStore>,
        clock: Arc<dyn Clock>,
        config: &TaskpilotConfig,
    ) -> Self {
        let registry = Arc::new(ToolRegistry::standard(Arc::clone(&tasks)));
        let pipeline = Arc::new(LanguagePipeline::new(&config.language.urdu_keywords));
        let default_language =
            Language::parse(&config.language.default_language).unwrap_or(Language::English);
        Self {
            llm,
            tasks,
            conversations,
            registry,
            pipeline,
            clock,
            limits: TurnLimits {
                history_window: config.agent.history_window,
                recent_tasks_window: config.agent.recent_tasks_window,
                temperature: config.llm.temperature,
                max_tokens: config.llm.max_tokens,
            },
            default_language,
        }
    }

    /// Handle one chat turn for an authenticated user.
    ///
    /// A null `conversation_id` starts a new conversation; the created id
    /// is carried in the outcome. An unknown `language` code falls back to
    /// the configured default.
    pub async fn handle_chat_request(
        &self,
        user_id: &str,
        conversation_id: Option<&str>,
        message: &str,
        language: Option<&str>,
    ) -> Result<ChatOutcome, AgentError> {
        let language = match language {
            Some(code) => Language::parse(code).unwrap_or_else(|| {
                warn!(code, "unknown language code; using default");
                self.default_language
            }),
            None => self.default_language,
        };

        let agent = ChatAgent::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.tasks),
            Arc::clone(&self.conversations),
            Arc::clone(&self.registry),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.clock),
            self.limits,
        );
        agent
            .run(ChatTurn {
                user_id: user_id.to_string(),
                conversation_id: conversation_id.map(String::from),
                message: message.to_string(),
                language,
            })
            .await
    }

    /// All conversations of the user, most recently updated first.
    pub fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>, AgentError> {
        let conversations = self
            .conversations
            .list(user_id)
            .map_err(map_conversation_err)?;
        Ok(conversations
            .into_iter()
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title,
                updated_at: c.updated_at,
            })
            .collect())
    }

    /// Full ordered transcript of one conversation.
    pub fn get_conversation_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<MessageView>, AgentError> {
        let messages = self
            .conversations
            .all_messages(user_id, conversation_id)
            .map_err(map_conversation_err)?;
        Ok(messages
            .into_iter()
            .map(|m| MessageView {
                role: m.role,
                content: m.content,
                created_at: m.created_at,
            })
            .collect())
    }

    /// Delete a conversation and its messages.
    pub fn delete_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<(), AgentError> {
        self.conversations
            .delete(user_id, conversation_id)
            .map_err(map_conversation_err)
    }
}

fn map_conversation_err(e: ConversationError) -> AgentError {
    match e {
        ConversationError::NotFound { id } => AgentError::NotFound {
            what: format!("conversation {id}"),
        },
        ConversationError::Database(err) => {
            warn!(error = %err, "conversation store failed");
            AgentError::StorageUnavailable {
                conversation_id: None,
                assistant_text: Language::English.unavailable_apology().to_string(),
            }
        }
    }
}
