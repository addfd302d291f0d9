//! `complete_task` / `uncomplete_task` — flip a task's completion flag.
//!
//! One implementation registered twice, once per direction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use taskpilot_store::TaskStore;

use super::{parse_input, Tool, ToolFailure, ToolOutcome};

pub struct CompleteTaskTool {
    store: Arc<TaskStore>,
    completing: bool,
}

impl CompleteTaskTool {
    pub fn completing(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            completing: true,
        }
    }

    pub fn uncompleting(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            completing: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskIdInput {
    task_id: i64,
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        if self.completing {
            "complete_task"
        } else {
            "uncomplete_task"
        }
    }

    fn description(&self) -> &str {
        if self.completing {
            "Mark a task as done."
        } else {
            "Mark a previously completed task as not done."
        }
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "integer",
                    "description": "Id of the task to update."
                }
            },
            "required": ["task_id"]
        })
    }

    async fn call(
        &self,
        user_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure> {
        let input: TaskIdInput = parse_input(input)?;
        let task = self
            .store
            .set_completed(user_id, input.task_id, self.completing, now)?;
        let verb = if self.completing { "done" } else { "not done" };
        Ok(ToolOutcome::new(format!(
            "Marked task #{} as {verb}: {}",
            task.id, task.title
        )))
    }
}
