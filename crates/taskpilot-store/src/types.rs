use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task urgency. Exact-match semantics in filters: `critical` is not `high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Sort rank, most urgent first.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// How often a template task repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Monthly,
    /// Repeats every `recurrence_interval` days.
    Custom,
    None,
}

impl std::fmt::Display for RecurrencePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecurrencePattern::Daily => "daily",
            RecurrencePattern::Weekly => "weekly",
            RecurrencePattern::Monthly => "monthly",
            RecurrencePattern::Custom => "custom",
            RecurrencePattern::None => "none",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for RecurrencePattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(RecurrencePattern::Daily),
            "weekly" => Ok(RecurrencePattern::Weekly),
            "monthly" => Ok(RecurrencePattern::Monthly),
            "custom" => Ok(RecurrencePattern::Custom),
            "none" => Ok(RecurrencePattern::None),
            other => Err(format!("unknown recurrence pattern: {other}")),
        }
    }
}

/// Recurrence request attached to a new or updated task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecurrenceSpec {
    pub pattern: RecurrencePattern,
    /// Step multiplier (every N days/weeks/months). Must be positive.
    #[serde(default = "default_interval")]
    pub interval: u32,
}

fn default_interval() -> u32 {
    1
}

/// A persisted task row.
#[derive(Debug, Clone, Serialize)]
pub struct Task {
    /// Server-assigned rowid.
    pub id: i64,
    pub user_id: String,
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    pub category_id: Option<i64>,
    pub recurrence_pattern: RecurrencePattern,
    pub recurrence_interval: u32,
    /// Next occurrence slot; set iff `recurrence_pattern != none`.
    pub next_recurrence_date: Option<DateTime<Utc>>,
    /// Template this task was materialised from, if any.
    pub parent_recurrence_id: Option<i64>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Category {
    pub id: i64,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub id: i64,
    pub user_id: String,
    /// Stored in normal form: lowercased, no leading '#', no whitespace.
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Subtask {
    pub id: i64,
    pub task_id: i64,
    pub title: String,
    pub is_completed: bool,
    pub sort_order: i64,
}

/// Input for task creation. Free-text fields are resolved by the store:
/// hashtags become tag links, a trailing recurrence keyword in the title
/// becomes recurrence fields, and `due_date` accepts natural phrases.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    /// RFC-3339, `YYYY-MM-DD`, or a natural-language phrase.
    pub due_date: Option<String>,
    /// Category name, matched case-insensitively, created when missing.
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub recurrence: Option<RecurrenceSpec>,
    pub notes: Option<String>,
}

/// Partial update. `Some` fields are applied; everything else is untouched.
/// Fields cannot be cleared through this path.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<String>,
    pub category: Option<String>,
    pub notes: Option<String>,
    pub recurrence: Option<RecurrenceSpec>,
    pub is_completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
            && self.category.is_none()
            && self.notes.is_none()
            && self.recurrence.is_none()
            && self.is_completed.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    All,
    #[default]
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueFilter {
    /// Due within [start of today, start of tomorrow).
    Today,
    /// Due within [start of today, start of today + 7 days).
    ThisWeek,
    /// Due before now and not completed.
    Overdue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    Priority,
    DueDate,
    #[default]
    Created,
}

/// Query predicates for `list_tasks`. All predicates compose with AND.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: StatusFilter,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub due: Option<DueFilter>,
    pub tags: Vec<String>,
    /// Full-text match over title (weight A) and description (weight B).
    pub search: Option<String>,
    pub limit: Option<usize>,
    pub sort: Option<SortKey>,
}

/// Compact projection rendered into the LLM system prompt.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDigest {
    pub id: i64,
    pub title: String,
    pub is_completed: bool,
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
}
