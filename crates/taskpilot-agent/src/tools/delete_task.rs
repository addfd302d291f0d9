//! `delete_task` — permanent removal with cascade.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use taskpilot_store::TaskStore;

use super::{parse_input, Tool, ToolFailure, ToolOutcome};

pub struct DeleteTaskTool {
    store: Arc<TaskStore>,
}

impl DeleteTaskTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct DeleteTaskInput {
    task_id: i64,
}

#[async_trait]
impl Tool for DeleteTaskTool {
    fn name(&self) -> &str {
        "delete_task"
    }

    fn description(&self) -> &str {
        "Permanently delete a task, including its subtasks and tag links."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "integer",
                    "description": "Id of the task to delete."
                }
            },
            "required": ["task_id"]
        })
    }

    async fn call(
        &self,
        user_id: &str,
        input: Value,
        _now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure> {
        let input: DeleteTaskInput = parse_input(input)?;
        let task = self.store.get_task(user_id, input.task_id)?;
        self.store.delete_task(user_id, input.task_id)?;
        Ok(ToolOutcome::new(format!(
            "Deleted task #{}: {}",
            task.id, task.title
        )))
    }
}
