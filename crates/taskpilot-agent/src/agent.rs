//! The per-turn orchestrator.

use std::sync::Arc;

use tracing::{debug, info, warn};

use taskpilot_conversations::{ConversationError, ConversationStore, MessageRole};
use taskpilot_core::Clock;
use taskpilot_store::TaskStore;

use crate::error::AgentError;
use crate::extract::extract_action;
use crate::language::{Language, LanguagePipeline};
use crate::llm::{LlmClient, LlmRequest};
use crate::prompt;
use crate::tools::{ToolFailure, ToolRegistry};

/// One incoming turn.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub user_id: String,
    pub conversation_id: Option<String>,
    pub message: String,
    pub language: Language,
}

/// The turn's result.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub assistant_text: String,
    /// Name of the tool that ran, when the turn performed an action.
    pub performed_action: Option<String>,
}

/// Per-turn context limits, resolved from configuration by the caller.
#[derive(Debug, Clone, Copy)]
pub struct TurnLimits {
    pub history_window: usize,
    pub recent_tasks_window: usize,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// The chat agent. Constructed fresh for every turn and consumed by
/// [`ChatAgent::run`]; no state survives the call. Everything shared
/// between requests sits behind the injected `Arc`s.
pub struct ChatAgent {
    llm: Arc<dyn LlmClient>,
    tasks: Arc<TaskStore>,
    conversations: Arc<ConversationStore>,
    registry: Arc<ToolRegistry>,
    pipeline: Arc<LanguagePipeline>,
    clock: Arc<dyn Clock>,
    limits: TurnLimits,
}

impl ChatAgent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        tasks: Arc<TaskStore>,
        conversations: Arc<ConversationStore>,
        registry: Arc<ToolRegistry>,
        pipeline: Arc<LanguagePipeline>,
        clock: Arc<dyn Clock>,
        limits: TurnLimits,
    ) -> Self {
        Self {
            llm,
            tasks,
            conversations,
            registry,
            pipeline,
            clock,
            limits,
        }
    }

    /// Run the full turn: persist the user message, prompt the LLM, dispatch
    /// at most one tool, post-process the language, persist the reply.
    pub async fn run(self, turn: ChatTurn) -> Result<ChatOutcome, AgentError> {
        let text = turn.message.trim();
        if text.is_empty() {
            return Err(AgentError::InvalidInput {
                field: "message".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        let language = turn.language;

        // 1. Resolve the conversation, creating one lazily on a null id.
        let conversation_id = match turn.conversation_id.as_deref() {
            Some(id) => {
                let conv = self
                    .conversations
                    .get(&turn.user_id, id)
                    .map_err(|e| conversation_err(e, None, language))?;
                conv.id
            }
            None => {
                let conv = self
                    .conversations
                    .create(&turn.user_id, Some(text), self.clock.now())
                    .map_err(|e| conversation_err(e, None, language))?;
                conv.id
            }
        };

        // 2. Persist the user turn first; it must survive an LLM failure.
        self.conversations
            .append_message(
                &turn.user_id,
                &conversation_id,
                MessageRole::User,
                text,
                self.clock.now(),
            )
            .map_err(|e| conversation_err(e, Some(&conversation_id), language))?;

        // 3. Context: recent window (now ending with the user turn) and the
        // recent-task projection the LLM references ids from.
        let history = self
            .conversations
            .recent_messages(&turn.user_id, &conversation_id, self.limits.history_window)
            .map_err(|e| conversation_err(e, Some(&conversation_id), language))?;
        let digest = match self
            .tasks
            .recent_digest(&turn.user_id, self.limits.recent_tasks_window)
        {
            Ok(digest) => digest,
            Err(e) => {
                warn!(error = %e, "recent-task projection failed");
                let apology = language.unavailable_apology().to_string();
                // The conversation store is still healthy here; the error
                // turn is persisted like every other StorageUnavailable.
                let _ = self.conversations.append_message(
                    &turn.user_id,
                    &conversation_id,
                    MessageRole::Assistant,
                    &apology,
                    self.clock.now(),
                );
                return Err(AgentError::StorageUnavailable {
                    conversation_id: Some(conversation_id),
                    assistant_text: apology,
                });
            }
        };

        // 4 + 5. Build the prompt and make the one completion call.
        let request = LlmRequest {
            messages: prompt::build_messages(&self.registry, language, &digest, &history),
            temperature: self.limits.temperature,
            max_tokens: self.limits.max_tokens,
        };
        let raw = match self.llm.complete(&request).await {
            Ok(content) => content,
            Err(e) => {
                warn!(error = %e, "LLM call failed; serving apology");
                let apology = language.unavailable_apology().to_string();
                // Best-effort append; the turn is reported as an error regardless.
                let _ = self.conversations.append_message(
                    &turn.user_id,
                    &conversation_id,
                    MessageRole::Assistant,
                    &apology,
                    self.clock.now(),
                );
                return Err(AgentError::LlmUnavailable {
                    conversation_id,
                    assistant_text: apology,
                });
            }
        };

        // 6 + 7. Extract an action directive and dispatch it.
        let (assistant_text, performed_action) = match extract_action(&raw) {
            Some(directive) if self.registry.contains(&directive.action) => {
                debug!(action = %directive.action, "dispatching tool");
                match self
                    .registry
                    .dispatch(
                        &directive.action,
                        &turn.user_id,
                        directive.arguments,
                        self.clock.now(),
                    )
                    .await
                {
                    Ok(outcome) => {
                        info!(action = %directive.action, "tool succeeded");
                        let text = match directive.reply {
                            Some(reply) if reply != outcome.summary => {
                                format!("{}\n{}", outcome.summary, reply)
                            }
                            _ => outcome.summary,
                        };
                        (text, Some(directive.action))
                    }
                    Err(ToolFailure::InvalidInput { field, reason }) => {
                        debug!(%field, %reason, "tool rejected input");
                        let text = directive.reply.unwrap_or_else(|| {
                            format!("Sorry, I couldn't do that. The {field} looks invalid: {reason}")
                        });
                        (text, None)
                    }
                    Err(ToolFailure::NotFound { what }) => {
                        (format!("I couldn't find {what}."), None)
                    }
                    Err(ToolFailure::StorageUnavailable) => {
                        let apology = language.unavailable_apology().to_string();
                        let _ = self.conversations.append_message(
                            &turn.user_id,
                            &conversation_id,
                            MessageRole::Assistant,
                            &apology,
                            self.clock.now(),
                        );
                        return Err(AgentError::StorageUnavailable {
                            conversation_id: Some(conversation_id),
                            assistant_text: apology,
                        });
                    }
                }
            }
            Some(directive) => {
                // JSON shaped like an action, but not one we know. Treat the
                // turn as conversational.
                debug!(action = %directive.action, "ignoring unregistered action");
                (directive.reply.unwrap_or(raw), None)
            }
            None => (raw, None),
        };

        // 8. Language post-hook.
        let assistant_text = self
            .pipeline
            .localise(self.llm.as_ref(), assistant_text, language)
            .await;

        // 9. Persist the assistant turn.
        self.conversations
            .append_message(
                &turn.user_id,
                &conversation_id,
                MessageRole::Assistant,
                &assistant_text,
                self.clock.now(),
            )
            .map_err(|e| conversation_err(e, Some(&conversation_id), language))?;

        // 10. Respond.
        Ok(ChatOutcome {
            conversation_id,
            assistant_text,
            performed_action,
        })
    }
}

fn conversation_err(
    e: ConversationError,
    conversation_id: Option<&str>,
    language: Language,
) -> AgentError {
    match e {
        ConversationError::NotFound { id } => AgentError::NotFound {
            what: format!("conversation {id}"),
        },
        ConversationError::Database(err) => {
            warn!(error = %err, "conversation store failed");
            storage_err(conversation_id, language)
        }
    }
}

fn storage_err(conversation_id: Option<&str>, language: Language) -> AgentError {
    AgentError::StorageUnavailable {
        conversation_id: conversation_id.map(String::from),
        assistant_text: language.unavailable_apology().to_string(),
    }
}
