//! Tool system: the closed set of actions the agent may take on the store.
//!
//! Each tool is a named record with a JSON input schema (rendered into the
//! system prompt), a typed input struct it parses arguments into, and a
//! dispatcher that runs under the acting user's id. Tools are deterministic
//! given the store state and atomic per call.

pub mod complete_task;
pub mod create_task;
pub mod delete_task;
pub mod list_tasks;
pub mod update_task;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tracing::error;

use taskpilot_store::{StoreError, TaskStore};

/// Result of a successful tool call: a short human-readable description
/// the agent can hand back to the user verbatim.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub summary: String,
}

impl ToolOutcome {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
        }
    }
}

/// The failure kinds a tool may raise. Everything else the store can do
/// wrong collapses into `StorageUnavailable`; internals never leak.
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("storage unavailable")]
    StorageUnavailable,
}

impl ToolFailure {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ToolFailure::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for ToolFailure {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidInput { field, reason } => ToolFailure::InvalidInput {
                field: field.to_string(),
                reason,
            },
            StoreError::NotFound { what } => ToolFailure::NotFound { what },
            StoreError::Database(err) => {
                error!(error = %err, "store operation failed");
                ToolFailure::StorageUnavailable
            }
        }
    }
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name (e.g. "create_task").
    fn name(&self) -> &str;
    /// One-line description rendered into the prompt catalogue.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's arguments.
    fn input_schema(&self) -> serde_json::Value;
    /// Execute under the acting user's id.
    async fn call(
        &self,
        user_id: &str,
        input: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure>;
}

/// The closed set of tools available to the agent.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The standard task tool set over `store`.
    pub fn standard(store: Arc<TaskStore>) -> Self {
        Self {
            tools: vec![
                Box::new(create_task::CreateTaskTool::new(Arc::clone(&store))),
                Box::new(list_tasks::ListTasksTool::new(Arc::clone(&store))),
                Box::new(complete_task::CompleteTaskTool::completing(Arc::clone(
                    &store,
                ))),
                Box::new(complete_task::CompleteTaskTool::uncompleting(Arc::clone(
                    &store,
                ))),
                Box::new(update_task::UpdateTaskTool::new(Arc::clone(&store))),
                Box::new(delete_task::DeleteTaskTool::new(store)),
            ],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Tool> {
        self.tools.iter().map(|t| t.as_ref())
    }

    /// Invoke the named tool for `user_id`.
    pub async fn dispatch(
        &self,
        name: &str,
        user_id: &str,
        input: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolFailure::invalid("action", format!("unknown action: {name}")))?;
        tool.call(user_id, input, now).await
    }
}

/// Parse tool arguments into their typed input struct. Unknown fields are
/// ignored by policy; type mismatches surface as `InvalidInput`.
pub(crate) fn parse_input<T: DeserializeOwned>(input: serde_json::Value) -> Result<T, ToolFailure> {
    serde_json::from_value(input)
        .map_err(|e| ToolFailure::invalid("arguments", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn registry() -> ToolRegistry {
        let store = Arc::new(TaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
        ToolRegistry::standard(store)
    }

    #[test]
    fn standard_set_is_complete() {
        let r = registry();
        for name in [
            "create_task",
            "list_tasks",
            "complete_task",
            "uncomplete_task",
            "update_task",
            "delete_task",
        ] {
            assert!(r.contains(name), "missing tool: {name}");
        }
        assert!(!r.contains("drop_database"));
    }

    #[tokio::test]
    async fn dispatch_to_unknown_tool_is_invalid_input() {
        let r = registry();
        let err = r
            .dispatch("fly_to_moon", "u1", serde_json::json!({}), chrono::Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::InvalidInput { .. }));
    }
}
