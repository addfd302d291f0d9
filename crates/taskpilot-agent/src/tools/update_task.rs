//! `update_task` — apply a partial edit to a task.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use taskpilot_store::{Priority, RecurrencePattern, RecurrenceSpec, TaskPatch, TaskStore};

use super::{parse_input, Tool, ToolFailure, ToolOutcome};

pub struct UpdateTaskTool {
    store: Arc<TaskStore>,
}

impl UpdateTaskTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateTaskInput {
    task_id: i64,
    #[serde(default)]
    fields: UpdateFields,
}

/// The editable subset of a task. Unknown keys are ignored by policy.
#[derive(Debug, Default, Deserialize)]
struct UpdateFields {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    is_completed: Option<bool>,
    #[serde(default)]
    recurrence: Option<RecurrenceInput>,
}

#[derive(Debug, Deserialize)]
struct RecurrenceInput {
    pattern: String,
    #[serde(default = "default_interval")]
    interval: u32,
}

fn default_interval() -> u32 {
    1
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn name(&self) -> &str {
        "update_task"
    }

    fn description(&self) -> &str {
        "Update fields of an existing task. Only the provided fields change."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "integer",
                    "description": "Id of the task to update."
                },
                "fields": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "description": { "type": "string" },
                        "priority": {
                            "type": "string",
                            "enum": ["critical", "high", "medium", "low"]
                        },
                        "due_date": { "type": "string" },
                        "category": { "type": "string" },
                        "notes": { "type": "string" },
                        "is_completed": { "type": "boolean" },
                        "recurrence": {
                            "type": "object",
                            "properties": {
                                "pattern": {
                                    "type": "string",
                                    "enum": ["daily", "weekly", "monthly", "custom", "none"]
                                },
                                "interval": { "type": "integer" }
                            },
                            "required": ["pattern"]
                        }
                    }
                }
            },
            "required": ["task_id", "fields"]
        })
    }

    async fn call(
        &self,
        user_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure> {
        let input: UpdateTaskInput = parse_input(input)?;

        let priority = match input.fields.priority.as_deref() {
            Some(raw) => Some(
                raw.parse::<Priority>()
                    .map_err(|e| ToolFailure::invalid("priority", e))?,
            ),
            None => None,
        };
        let recurrence = match input.fields.recurrence {
            Some(r) => {
                let pattern: RecurrencePattern = r
                    .pattern
                    .parse()
                    .map_err(|e: String| ToolFailure::invalid("recurrence", e))?;
                Some(RecurrenceSpec {
                    pattern,
                    interval: r.interval,
                })
            }
            None => None,
        };

        let patch = TaskPatch {
            title: input.fields.title,
            description: input.fields.description,
            priority,
            due_date: input.fields.due_date,
            category: input.fields.category,
            notes: input.fields.notes,
            recurrence,
            is_completed: input.fields.is_completed,
        };
        let task = self.store.update_task(user_id, input.task_id, patch, now)?;
        Ok(ToolOutcome::new(format!(
            "Updated task #{}: {}",
            task.id, task.title
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use taskpilot_store::NewTask;

    fn setup() -> (UpdateTaskTool, Arc<TaskStore>) {
        let store = Arc::new(TaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
        (UpdateTaskTool::new(Arc::clone(&store)), store)
    }

    fn now() -> DateTime<Utc> {
        "2025-01-10T12:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn applies_only_given_fields() {
        let (t, store) = setup();
        let task = store
            .create_task(
                "u1",
                NewTask {
                    title: "before".into(),
                    description: Some("unchanged".into()),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();

        t.call(
            "u1",
            json!({"task_id": task.id, "fields": {"title": "after", "priority": "low"}}),
            now(),
        )
        .await
        .unwrap();

        let got = store.get_task("u1", task.id).unwrap();
        assert_eq!(got.title, "after");
        assert_eq!(got.priority, Priority::Low);
        assert_eq!(got.description.as_deref(), Some("unchanged"));
    }

    #[tokio::test]
    async fn title_length_is_revalidated() {
        let (t, store) = setup();
        let task = store
            .create_task(
                "u1",
                NewTask {
                    title: "ok".into(),
                    ..Default::default()
                },
                now(),
            )
            .unwrap();
        let err = t
            .call(
                "u1",
                json!({"task_id": task.id, "fields": {"title": "x".repeat(201)}}),
                now(),
            )
            .await
            .unwrap_err();
        match err {
            ToolFailure::InvalidInput { field, .. } => assert_eq!(field, "title"),
            other => panic!("expected InvalidInput(title), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (t, _) = setup();
        let err = t
            .call("u1", json!({"task_id": 404, "fields": {"title": "x"}}), now())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolFailure::NotFound { .. }));
    }
}
