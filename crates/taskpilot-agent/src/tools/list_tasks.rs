//! `list_tasks` — read-only query over the acting user's tasks.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use taskpilot_store::{
    DueFilter, Priority, SortKey, StatusFilter, Task, TaskFilter, TaskStore,
};

use super::{parse_input, Tool, ToolFailure, ToolOutcome};

pub struct ListTasksTool {
    store: Arc<TaskStore>,
}

impl ListTasksTool {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
struct ListTasksInput {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    due_filter: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    limit: Option<u32>,
    #[serde(default)]
    sort: Option<String>,
}

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List the user's tasks, optionally filtered by status, category, priority, \
         due window, tags, or a text search."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {
                    "type": "string",
                    "enum": ["all", "active", "completed"],
                    "description": "Defaults to active."
                },
                "category": { "type": "string" },
                "priority": {
                    "type": "string",
                    "enum": ["critical", "high", "medium", "low"]
                },
                "due_filter": {
                    "type": "string",
                    "enum": ["today", "this_week", "overdue", "none"]
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" }
                },
                "search": {
                    "type": "string",
                    "description": "Full-text search over title and description."
                },
                "limit": {
                    "type": "integer",
                    "description": "Max results, default 50, max 100."
                },
                "sort": {
                    "type": "string",
                    "enum": ["priority", "due_date", "created"]
                }
            }
        })
    }

    async fn call(
        &self,
        user_id: &str,
        input: Value,
        now: DateTime<Utc>,
    ) -> Result<ToolOutcome, ToolFailure> {
        let input: ListTasksInput = parse_input(input)?;

        let status = match input.status.as_deref() {
            None => StatusFilter::Active,
            Some("all") => StatusFilter::All,
            Some("active") => StatusFilter::Active,
            Some("completed") => StatusFilter::Completed,
            Some(other) => {
                return Err(ToolFailure::invalid(
                    "status",
                    format!("unknown status: {other}"),
                ))
            }
        };
        let priority = match input.priority.as_deref() {
            Some(raw) => Some(
                raw.parse::<Priority>()
                    .map_err(|e| ToolFailure::invalid("priority", e))?,
            ),
            None => None,
        };
        let due = match input.due_filter.as_deref() {
            None | Some("none") => None,
            Some("today") => Some(DueFilter::Today),
            Some("this_week") => Some(DueFilter::ThisWeek),
            Some("overdue") => Some(DueFilter::Overdue),
            Some(other) => {
                return Err(ToolFailure::invalid(
                    "due_filter",
                    format!("unknown due filter: {other}"),
                ))
            }
        };
        let sort = match input.sort.as_deref() {
            None => None,
            Some("priority") => Some(SortKey::Priority),
            Some("due_date") => Some(SortKey::DueDate),
            Some("created") => Some(SortKey::Created),
            Some(other) => {
                return Err(ToolFailure::invalid("sort", format!("unknown sort: {other}")))
            }
        };

        let filter = TaskFilter {
            status,
            category: input.category,
            priority,
            due,
            tags: input.tags,
            search: input.search,
            limit: input.limit.map(|n| n as usize),
            sort,
        };
        let tasks = self.store.list_tasks(user_id, &filter, now)?;
        Ok(ToolOutcome::new(render(&tasks)))
    }
}

fn render(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No matching tasks.".to_string();
    }
    let mut out = format!(
        "You have {} matching task{}:\n",
        tasks.len(),
        if tasks.len() == 1 { "" } else { "s" }
    );
    for t in tasks {
        let _ = write!(out, "- #{} {} ({})", t.id, t.title, t.priority);
        if t.is_completed {
            out.push_str(" [done]");
        }
        if let Some(due) = t.due_date {
            let _ = write!(out, ", due {}", due.format("%Y-%m-%d"));
        }
        out.push('\n');
    }
    out.pop();
    out
}
