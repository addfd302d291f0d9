//! System prompt construction for a chat turn.

use std::fmt::Write as _;

use taskpilot_conversations::{MessageRole, StoredMessage};
use taskpilot_store::TaskDigest;

use crate::language::Language;
use crate::llm::{ChatMessage, Role};
use crate::tools::ToolRegistry;

/// Assemble the full message list for the chat-completion call: one system
/// message followed by the recent conversation window (which already ends
/// with the just-persisted user turn).
pub fn build_messages(
    registry: &ToolRegistry,
    language: Language,
    digest: &[TaskDigest],
    history: &[StoredMessage],
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(render_system(
        registry, language, digest,
    )));
    for m in history {
        let role = match m.role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
        };
        messages.push(ChatMessage {
            role,
            content: m.content.clone(),
        });
    }
    messages
}

fn render_system(registry: &ToolRegistry, language: Language, digest: &[TaskDigest]) -> String {
    let mut out = String::from(
        "You are a task management assistant. You help the user create, list, \
         update, complete, and delete their tasks through conversation.\n\n",
    );

    match language {
        Language::English => out.push_str("Respond in English.\n\n"),
        Language::Urdu => out.push_str("Respond in Urdu (اردو).\n\n"),
    }

    out.push_str(
        "When the user's intent is an action, reply with a single JSON object of \
         the form {\"action\": \"...\", \"arguments\": {...}, \"reply\": \"...\"}; \
         otherwise reply with prose only. Never invent task ids: only use ids \
         listed below or returned by earlier actions.\n\nAvailable actions:\n",
    );
    for tool in registry.iter() {
        let _ = writeln!(
            out,
            "- {}: {}\n  arguments schema: {}",
            tool.name(),
            tool.description(),
            tool.input_schema()
        );
    }

    if digest.is_empty() {
        out.push_str("\nThe user has no tasks yet.\n");
    } else {
        out.push_str("\nThe user's recent tasks (id, status, priority, title, due):\n");
        for d in digest {
            out.push_str(&render_digest_line(d));
            out.push('\n');
        }
    }
    out
}

fn render_digest_line(d: &TaskDigest) -> String {
    let status = if d.is_completed { "done" } else { "open" };
    let mut line = format!("#{} [{}] ({}) {}", d.id, status, d.priority, d.title);
    if let Some(due) = d.due_date {
        let _ = write!(line, " due {}", due.format("%Y-%m-%d"));
    }
    line
}
