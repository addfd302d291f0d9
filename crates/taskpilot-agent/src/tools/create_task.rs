//! `create_task` — insert a new task for the acting user.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use taskpilot_store::{NewTask, Priority, RecurrencePattern, RecurrenceSpec, TaskStore};

use super::{parse_input, Tool, ToolFailure, ToolOutcome};

pub struct CreateTaskTool {
    store: Arc<TaskStore>,
}

impl CreateTaskTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct CreateTaskInput {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    recurrence: Option<RecurrenceInput>,
    #[serde(default)]
    notes: Option<String>,
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
impl Tool for CreateTaskTool {
    fn name(&self) -> &str {
        "create_task"
    }

    fn description(&self) -> &str {
        "Create a new task. Supports a due date in natural language, a category, \
         tags, and a recurrence pattern."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Task title, 1..200 characters. Required."
                },
                "description": { "type": "string" },
                "priority": {
                    "type": "string",
                    "enum": ["critical", "high", "medium", "low"],
                    "description": "Defaults to medium."
                },
                "due_date": {
                    "type": "string",
                    "description": "RFC-3339, YYYY-MM-DD, or a phrase like 'tomorrow' or 'next friday'."
                },
                "category": {
                    "type": "string",
                    "description": "Category name; created if it does not exist."
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "recurrence": {
                    "type": "object",
                    "properties": {
                        "pattern": {
                            "type": "string",
                            "enum": ["daily", "weekly", "monthly", "custom"]
                        },
                        "interval": {
                            "type": "integer",
                            "description": "Every N days/weeks/months. Defaults to 1."
                        }
                    },
                    "required": ["pattern"]
                },
                "notes": { "type": "string" }
            },
            "required": ["title"]
        })
    }

    async fn call(
        &self,
        user_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure> {
        let input: CreateTaskInput = parse_input(input)?;

        let priority = match input.priority.as_deref() {
            Some(raw) => Some(
                raw.parse::<Priority>()
                    .map_err(|e| ToolFailure::invalid("priority", e))?,
            ),
            None => None,
        };
        let recurrence = match input.recurrence {
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

        let task = self.store.create_task(
            user_id,
            NewTask {
                title: input.title,
                description: input.description,
                priority,
                due_date: input.due_date,
                category: input.category,
                tags: input.tags,
                recurrence,
                notes: input.notes,
            },
            now,
        )?;

        let mut summary = format!("Created task #{}: {}", task.id, task.title);
        if let Some(due) = task.due_date {
            summary.push_str(&format!(" (due {})", due.format("%Y-%m-%d")));
        }
        if task.recurrence_pattern != RecurrencePattern::None {
            summary.push_str(&format!(", repeats {}", task.recurrence_pattern));
        }
        Ok(ToolOutcome::new(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn tool() -> (CreateTaskTool, Arc<TaskStore>) {
        let store = Arc::new(TaskStore::new(Connection::open_in_memory().unwrap()).unwrap());
        (CreateTaskTool::new(Arc::clone(&store)), store)
    }

    fn now() -> DateTime<Utc> {
        "2025-01-10T12:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn creates_with_all_fields() {
        let (t, store) = tool();
        let out = t
            .call(
                "u1",
                json!({
                    "title": "Buy milk",
                    "priority": "high",
                    "due_date": "tomorrow",
                    "category": "Errands",
                    "tags": ["shopping"],
                }),
                now(),
            )
            .await
            .unwrap();
        assert!(out.summary.starts_with("Created task #"));
        assert!(out.summary.contains("Buy milk"));
        assert!(out.summary.contains("due 2025-01-11"));

        let listed = store
            .list_tasks("u1", &Default::default(), now())
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].priority, Priority::High);
    }

    #[tokio::test]
    async fn missing_title_is_invalid_arguments() {
        let (t, _) = tool();
        let err = t.call("u1", json!({}), now()).await.unwrap_err();
        assert!(matches!(err, ToolFailure::InvalidInput { .. }));
    }

    #[tokio::test]
    async fn bad_priority_names_the_field() {
        let (t, _) = tool();
        let err = t
            .call("u1", json!({"title": "x", "priority": "urgent"}), now())
            .await
            .unwrap_err();
        match err {
            ToolFailure::InvalidInput { field, .. } => assert_eq!(field, "priority"),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_fields_are_ignored() {
        let (t, _) = tool();
        let out = t
            .call("u1", json!({"title": "x", "favourite_colour": "blue"}), now())
            .await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn recurrence_is_applied() {
        let (t, store) = tool();
        t.call(
            "u1",
            json!({"title": "standup", "recurrence": {"pattern": "daily"}}),
            now(),
        )
        .await
        .unwrap();
        let task = &store.list_tasks("u1", &Default::default(), now()).unwrap()[0];
        assert_eq!(task.recurrence_pattern, RecurrencePattern::Daily);
        assert!(task.next_recurrence_date.is_some());
    }
}
