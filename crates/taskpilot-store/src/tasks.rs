use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::natural_date::parse_natural_date;
use crate::parse::{extract_hashtags, normalize_tag, split_trailing_recurrence};
use crate::schedule::next_occurrence;
use crate::types::*;

/// Hard cap on `list_tasks` result size; requests above it are clamped.
const MAX_LIST_LIMIT: usize = 100;
const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_TITLE_CHARS: usize = 200;

const TASK_COLS: &str = "id, user_id, title, description, is_completed, priority, due_date, \
     category_id, recurrence_pattern, recurrence_interval, next_recurrence_date, \
     parent_recurrence_id, notes, created_at, updated_at";

const TASK_COLS_T: &str = "t.id, t.user_id, t.title, t.description, t.is_completed, t.priority, \
     t.due_date, t.category_id, t.recurrence_pattern, t.recurrence_interval, \
     t.next_recurrence_date, t.parent_recurrence_id, t.notes, t.created_at, t.updated_at";

/// Thread-safe, user-scoped task store.
///
/// Wraps a single SQLite connection in a `Mutex`. Every operation applies
/// the acting user's id as a predicate; rows of other users surface as
/// `NotFound`. The recurrence materialiser is the one caller that reads
/// across users, and it writes derived rows under the owner read from the
/// template itself.
pub struct TaskStore {
    db: Mutex<Connection>,
}

impl TaskStore {
    /// Open a store over `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    // --- task CRUD ---------------------------------------------------------

    /// Insert a new task for `user_id`.
    ///
    /// Resolves natural-text structure before persisting: `#tag` tokens in
    /// the title are stripped and linked, hashtags in the description are
    /// linked (text kept), a trailing recurrence keyword on the title sets
    /// the recurrence fields unless the input already carries one, and the
    /// due date accepts natural phrases pinned to `now`.
    #[instrument(skip(self, input), fields(user_id))]
    pub fn create_task(&self, user_id: &str, input: NewTask, now: DateTime<Utc>) -> Result<Task> {
        let (title, mut tag_names) = extract_hashtags(&input.title);
        let (title, trailing) = split_trailing_recurrence(&title);
        let title = validate_title(&title)?;

        if let Some(desc) = input.description.as_deref() {
            let (_, desc_tags) = extract_hashtags(desc);
            for t in desc_tags {
                if !tag_names.contains(&t) {
                    tag_names.push(t);
                }
            }
        }
        for raw in &input.tags {
            if let Some(t) = normalize_tag(raw) {
                if !tag_names.contains(&t) {
                    tag_names.push(t);
                }
            }
        }

        let recurrence = match input.recurrence {
            Some(spec) if spec.pattern != RecurrencePattern::None => {
                if spec.interval == 0 {
                    return Err(StoreError::invalid(
                        "recurrence",
                        "interval must be a positive integer",
                    ));
                }
                Some(spec)
            }
            Some(_) => None,
            None => trailing.map(|pattern| RecurrenceSpec {
                pattern,
                interval: 1,
            }),
        };

        let due_date = match input.due_date.as_deref() {
            Some(raw) => Some(parse_due_date(raw, now)?),
            None => None,
        };

        let priority = input.priority.unwrap_or(Priority::Medium);
        let (pattern, interval) = match recurrence {
            Some(spec) => (spec.pattern, spec.interval),
            None => (RecurrencePattern::None, 1),
        };
        let next_recurrence = next_occurrence(pattern, interval, now);

        let now_str = now.to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let category_id = match input.category.as_deref() {
            Some(name) => Some(resolve_category(&tx, user_id, name, &now_str)?),
            None => None,
        };

        tx.execute(
            "INSERT INTO tasks
             (user_id, title, description, is_completed, priority, due_date, category_id,
              recurrence_pattern, recurrence_interval, next_recurrence_date, notes,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            rusqlite::params![
                user_id,
                title,
                input.description,
                priority.to_string(),
                due_date.map(|d| d.to_rfc3339()),
                category_id,
                pattern.to_string(),
                interval,
                next_recurrence.map(|d| d.to_rfc3339()),
                input.notes,
                now_str,
            ],
        )?;
        let task_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO tasks_fts(rowid, title, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![task_id, title, input.description],
        )?;

        for tag in &tag_names {
            let tag_id = resolve_tag(&tx, user_id, tag)?;
            tx.execute(
                "INSERT OR IGNORE INTO task_tags (task_id, tag_id) VALUES (?1, ?2)",
                rusqlite::params![task_id, tag_id],
            )?;
        }

        log_activity(
            &tx,
            user_id,
            task_id,
            "created",
            json!({ "new": { "title": title, "priority": priority.to_string() } }),
            &now_str,
        )?;
        tx.commit()?;

        info!(task_id, user_id, "task created");

        Ok(Task {
            id: task_id,
            user_id: user_id.to_string(),
            title,
            description: input.description,
            is_completed: false,
            priority,
            due_date,
            category_id,
            recurrence_pattern: pattern,
            recurrence_interval: interval,
            next_recurrence_date: next_recurrence,
            parent_recurrence_id: None,
            notes: input.notes,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a single task under the ownership predicate.
    pub fn get_task(&self, user_id: &str, task_id: i64) -> Result<Task> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1 AND user_id = ?2"),
            rusqlite::params![task_id, user_id],
            row_to_task,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found(format!("task {task_id}")))
    }

    /// Query tasks by the composed filter predicates.
    ///
    /// Ordering: the requested sort, ties broken by `created_at` desc.
    /// A search without an explicit sort orders by FTS rank with the
    /// title weighted above the description.
    #[instrument(skip(self, filter), fields(user_id))]
    pub fn list_tasks(
        &self,
        user_id: &str,
        filter: &TaskFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut clauses: Vec<String> = vec!["t.user_id = ?".into()];
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(user_id.to_string())];

        match filter.status {
            StatusFilter::Active => clauses.push("t.is_completed = 0".into()),
            StatusFilter::Completed => clauses.push("t.is_completed = 1".into()),
            StatusFilter::All => {}
        }

        if let Some(p) = filter.priority {
            clauses.push("t.priority = ?".into());
            values.push(SqlValue::Text(p.to_string()));
        }

        if let Some(name) = filter.category.as_deref() {
            clauses.push(
                "t.category_id IN (SELECT id FROM categories
                  WHERE user_id = ? AND LOWER(name) = LOWER(?))"
                    .into(),
            );
            values.push(SqlValue::Text(user_id.to_string()));
            values.push(SqlValue::Text(name.to_string()));
        }

        for raw in &filter.tags {
            let Some(tag) = normalize_tag(raw) else {
                continue;
            };
            clauses.push(
                "EXISTS (SELECT 1 FROM task_tags tt
                  JOIN tags g ON g.id = tt.tag_id
                  WHERE tt.task_id = t.id AND g.user_id = ? AND g.name = ?)"
                    .into(),
            );
            values.push(SqlValue::Text(user_id.to_string()));
            values.push(SqlValue::Text(tag));
        }

        if let Some(due) = filter.due {
            let day_start = now.date_naive().and_time(chrono::NaiveTime::MIN).and_utc();
            match due {
                DueFilter::Today => {
                    clauses.push("t.due_date IS NOT NULL AND t.due_date >= ? AND t.due_date < ?".into());
                    values.push(SqlValue::Text(day_start.to_rfc3339()));
                    values.push(SqlValue::Text((day_start + Duration::days(1)).to_rfc3339()));
                }
                DueFilter::ThisWeek => {
                    clauses.push("t.due_date IS NOT NULL AND t.due_date >= ? AND t.due_date < ?".into());
                    values.push(SqlValue::Text(day_start.to_rfc3339()));
                    values.push(SqlValue::Text((day_start + Duration::days(7)).to_rfc3339()));
                }
                DueFilter::Overdue => {
                    clauses.push("t.due_date IS NOT NULL AND t.due_date < ? AND t.is_completed = 0".into());
                    values.push(SqlValue::Text(now.to_rfc3339()));
                }
            }
        }

        let searching = matches!(filter.search.as_deref(), Some(s) if !s.trim().is_empty());
        let from = if searching {
            clauses.push("tasks_fts MATCH ?".into());
            values.push(SqlValue::Text(fts_query(
                filter.search.as_deref().unwrap_or(""),
            )));
            format!("SELECT {TASK_COLS_T} FROM tasks t JOIN tasks_fts ON tasks_fts.rowid = t.id")
        } else {
            format!("SELECT {TASK_COLS_T} FROM tasks t")
        };

        let order = match filter.sort {
            Some(SortKey::Priority) => {
                "CASE t.priority WHEN 'critical' THEN 0 WHEN 'high' THEN 1
                  WHEN 'medium' THEN 2 ELSE 3 END, t.created_at DESC"
            }
            Some(SortKey::DueDate) => "t.due_date IS NULL, t.due_date ASC, t.created_at DESC",
            Some(SortKey::Created) => "t.created_at DESC",
            // Title carries weight 5.0, description 1.0; lower bm25 is a
            // better match.
            None if searching => "bm25(tasks_fts, 5.0, 1.0), t.created_at DESC",
            None => "t.created_at DESC",
        };

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        values.push(SqlValue::Integer(limit as i64));

        let sql = format!(
            "{from} WHERE {} ORDER BY {order} LIMIT ?",
            clauses.join(" AND ")
        );
        debug!(%sql, "list_tasks query");

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(values), row_to_task)?;
        let tasks: Vec<Task> = rows.collect::<rusqlite::Result<_>>()?;
        Ok(tasks)
    }

    /// Flip the completion flag. `NotFound` when the task is not the
    /// acting user's.
    pub fn set_completed(
        &self,
        user_id: &str,
        task_id: i64,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let now_str = now.to_rfc3339();
        {
            let mut db = self.db.lock().unwrap();
            let tx = db.transaction()?;
            let changed = tx.execute(
                "UPDATE tasks SET is_completed = ?1, updated_at = ?2
                 WHERE id = ?3 AND user_id = ?4",
                rusqlite::params![completed as i64, now_str, task_id, user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found(format!("task {task_id}")));
            }
            log_activity(
                &tx,
                user_id,
                task_id,
                if completed { "completed" } else { "uncompleted" },
                json!({ "new": { "is_completed": completed } }),
                &now_str,
            )?;
            tx.commit()?;
        }
        self.get_task(user_id, task_id)
    }

    /// Apply the provided fields of `patch`; everything else is untouched.
    #[instrument(skip(self, patch), fields(user_id, task_id))]
    pub fn update_task(
        &self,
        user_id: &str,
        task_id: i64,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let old = self.get_task(user_id, task_id)?;
        if patch.is_empty() {
            return Ok(old);
        }

        let title = match patch.title.as_deref() {
            Some(raw) => Some(validate_title(raw)?),
            None => None,
        };
        let due_date = match patch.due_date.as_deref() {
            Some(raw) => Some(parse_due_date(raw, now)?),
            None => None,
        };
        if let Some(spec) = patch.recurrence {
            if spec.pattern != RecurrencePattern::None && spec.interval == 0 {
                return Err(StoreError::invalid(
                    "recurrence",
                    "interval must be a positive integer",
                ));
            }
        }

        let now_str = now.to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let category_id = match patch.category.as_deref() {
            Some(name) => Some(resolve_category(&tx, user_id, name, &now_str)?),
            None => None,
        };

        let mut sets: Vec<&str> = vec!["updated_at = ?"];
        let mut values: Vec<SqlValue> = vec![SqlValue::Text(now_str.clone())];

        if let Some(t) = &title {
            sets.push("title = ?");
            values.push(SqlValue::Text(t.clone()));
        }
        if let Some(d) = &patch.description {
            sets.push("description = ?");
            values.push(SqlValue::Text(d.clone()));
        }
        if let Some(p) = patch.priority {
            sets.push("priority = ?");
            values.push(SqlValue::Text(p.to_string()));
        }
        if let Some(d) = due_date {
            sets.push("due_date = ?");
            values.push(SqlValue::Text(d.to_rfc3339()));
        }
        if let Some(id) = category_id {
            sets.push("category_id = ?");
            values.push(SqlValue::Integer(id));
        }
        if let Some(n) = &patch.notes {
            sets.push("notes = ?");
            values.push(SqlValue::Text(n.clone()));
        }
        if let Some(done) = patch.is_completed {
            sets.push("is_completed = ?");
            values.push(SqlValue::Integer(done as i64));
        }
        if let Some(spec) = patch.recurrence {
            sets.push("recurrence_pattern = ?");
            values.push(SqlValue::Text(spec.pattern.to_string()));
            sets.push("recurrence_interval = ?");
            values.push(SqlValue::Integer(spec.interval as i64));
            sets.push("next_recurrence_date = ?");
            match next_occurrence(spec.pattern, spec.interval, now) {
                Some(next) => values.push(SqlValue::Text(next.to_rfc3339())),
                None => values.push(SqlValue::Null),
            }
        }

        values.push(SqlValue::Integer(task_id));
        values.push(SqlValue::Text(user_id.to_string()));
        let sql = format!(
            "UPDATE tasks SET {} WHERE id = ? AND user_id = ?",
            sets.join(", ")
        );
        let changed = tx.execute(&sql, rusqlite::params_from_iter(values))?;
        if changed == 0 {
            return Err(StoreError::not_found(format!("task {task_id}")));
        }

        // Keep the search index aligned with the stored row.
        let new_title = title.as_deref().unwrap_or(&old.title);
        let new_desc = patch
            .description
            .as_deref()
            .or(old.description.as_deref());
        tx.execute(
            "INSERT INTO tasks_fts(tasks_fts, rowid, title, description)
             VALUES('delete', ?1, ?2, ?3)",
            rusqlite::params![task_id, old.title, old.description],
        )?;
        tx.execute(
            "INSERT INTO tasks_fts(rowid, title, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![task_id, new_title, new_desc],
        )?;

        // Snapshot exactly the fields the patch touched.
        let mut old_detail = serde_json::Map::new();
        let mut new_detail = serde_json::Map::new();
        if let Some(t) = &title {
            old_detail.insert("title".into(), json!(old.title));
            new_detail.insert("title".into(), json!(t));
        }
        if let Some(d) = &patch.description {
            old_detail.insert("description".into(), json!(old.description));
            new_detail.insert("description".into(), json!(d));
        }
        if let Some(p) = patch.priority {
            old_detail.insert("priority".into(), json!(old.priority.to_string()));
            new_detail.insert("priority".into(), json!(p.to_string()));
        }
        if let Some(d) = due_date {
            old_detail.insert(
                "due_date".into(),
                json!(old.due_date.map(|d| d.to_rfc3339())),
            );
            new_detail.insert("due_date".into(), json!(d.to_rfc3339()));
        }
        if let Some(id) = category_id {
            old_detail.insert("category_id".into(), json!(old.category_id));
            new_detail.insert("category_id".into(), json!(id));
        }
        if let Some(n) = &patch.notes {
            old_detail.insert("notes".into(), json!(old.notes));
            new_detail.insert("notes".into(), json!(n));
        }
        if let Some(done) = patch.is_completed {
            old_detail.insert("is_completed".into(), json!(old.is_completed));
            new_detail.insert("is_completed".into(), json!(done));
        }
        if let Some(spec) = patch.recurrence {
            old_detail.insert(
                "recurrence_pattern".into(),
                json!(old.recurrence_pattern.to_string()),
            );
            new_detail.insert(
                "recurrence_pattern".into(),
                json!(spec.pattern.to_string()),
            );
            old_detail.insert(
                "recurrence_interval".into(),
                json!(old.recurrence_interval),
            );
            new_detail.insert("recurrence_interval".into(), json!(spec.interval));
        }

        log_activity(
            &tx,
            user_id,
            task_id,
            "updated",
            json!({ "old": old_detail, "new": new_detail }),
            &now_str,
        )?;
        tx.commit()?;
        drop(db);

        self.get_task(user_id, task_id)
    }

    /// Permanently delete a task and its dependents (subtasks, tag links,
    /// activity rows, search index entry).
    #[instrument(skip(self), fields(user_id, task_id))]
    pub fn delete_task(&self, user_id: &str, task_id: i64) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let row: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT title, description FROM tasks WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![task_id, user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((title, description)) = row else {
            return Err(StoreError::not_found(format!("task {task_id}")));
        };

        tx.execute(
            "INSERT INTO tasks_fts(tasks_fts, rowid, title, description)
             VALUES('delete', ?1, ?2, ?3)",
            rusqlite::params![task_id, title, description],
        )?;
        tx.execute("DELETE FROM task_tags WHERE task_id = ?1", [task_id])?;
        tx.execute("DELETE FROM subtasks WHERE task_id = ?1", [task_id])?;
        tx.execute("DELETE FROM activities WHERE task_id = ?1", [task_id])?;
        tx.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![task_id, user_id],
        )?;
        tx.commit()?;

        info!(task_id, user_id, "task deleted");
        Ok(())
    }

    /// Most recent N tasks of the user, projected for the LLM prompt.
    pub fn recent_digest(&self, user_id: &str, limit: usize) -> Result<Vec<TaskDigest>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, title, is_completed, priority, due_date FROM tasks
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![user_id, limit as i64], |row| {
            let priority_s: String = row.get(3)?;
            Ok(TaskDigest {
                id: row.get(0)?,
                title: row.get(1)?,
                is_completed: row.get::<_, i64>(2)? != 0,
                priority: priority_s.parse().map_err(|e: String| conv_err(3, e))?,
                due_date: opt_ts(row, 4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // --- categories, tags, subtasks ----------------------------------------

    /// Delete a category; tasks referencing it are detached, never deleted.
    pub fn delete_category(&self, user_id: &str, category_id: i64) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        tx.execute(
            "UPDATE tasks SET category_id = NULL
             WHERE category_id = ?1 AND user_id = ?2",
            rusqlite::params![category_id, user_id],
        )?;
        let changed = tx.execute(
            "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![category_id, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(format!("category {category_id}")));
        }
        tx.commit()?;
        Ok(())
    }

    pub fn list_categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, name, color, icon FROM categories
             WHERE user_id = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map([user_id], |row| {
            Ok(Category {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
                color: row.get(3)?,
                icon: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn list_tags(&self, user_id: &str) -> Result<Vec<Tag>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT id, user_id, name FROM tags WHERE user_id = ?1 ORDER BY name")?;
        let rows = stmt.query_map([user_id], |row| {
            Ok(Tag {
                id: row.get(0)?,
                user_id: row.get(1)?,
                name: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Tag names linked to a task, in normal form, alphabetical.
    pub fn tags_for_task(&self, user_id: &str, task_id: i64) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT g.name FROM tags g
             JOIN task_tags tt ON tt.tag_id = g.id
             JOIN tasks t ON t.id = tt.task_id
             WHERE tt.task_id = ?1 AND t.user_id = ?2
             ORDER BY g.name",
        )?;
        let rows = stmt.query_map(rusqlite::params![task_id, user_id], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn add_subtask(&self, user_id: &str, task_id: i64, title: &str) -> Result<Subtask> {
        let title = validate_title(title)?;
        let db = self.db.lock().unwrap();

        let owned: Option<i64> = db
            .query_row(
                "SELECT id FROM tasks WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![task_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if owned.is_none() {
            return Err(StoreError::not_found(format!("task {task_id}")));
        }

        let next_order: i64 = db.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM subtasks WHERE task_id = ?1",
            [task_id],
            |row| row.get(0),
        )?;
        db.execute(
            "INSERT INTO subtasks (task_id, title, is_completed, sort_order)
             VALUES (?1, ?2, 0, ?3)",
            rusqlite::params![task_id, title, next_order],
        )?;
        Ok(Subtask {
            id: db.last_insert_rowid(),
            task_id,
            title,
            is_completed: false,
            sort_order: next_order,
        })
    }

    pub fn subtasks_for_task(&self, user_id: &str, task_id: i64) -> Result<Vec<Subtask>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT s.id, s.task_id, s.title, s.is_completed, s.sort_order
             FROM subtasks s JOIN tasks t ON t.id = s.task_id
             WHERE s.task_id = ?1 AND t.user_id = ?2
             ORDER BY s.sort_order",
        )?;
        let rows = stmt.query_map(rusqlite::params![task_id, user_id], |row| {
            Ok(Subtask {
                id: row.get(0)?,
                task_id: row.get(1)?,
                title: row.get(2)?,
                is_completed: row.get::<_, i64>(3)? != 0,
                sort_order: row.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    pub fn set_subtask_completed(
        &self,
        user_id: &str,
        subtask_id: i64,
        completed: bool,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE subtasks SET is_completed = ?1
             WHERE id = ?2 AND task_id IN (SELECT id FROM tasks WHERE user_id = ?3)",
            rusqlite::params![completed as i64, subtask_id, user_id],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found(format!("subtask {subtask_id}")));
        }
        Ok(())
    }

    // --- recurrence --------------------------------------------------------

    /// Recurring templates whose next occurrence has arrived. Read across
    /// users; the caller acts on behalf of each template's owner.
    pub fn due_templates(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {TASK_COLS} FROM tasks
             WHERE recurrence_pattern != 'none'
               AND next_recurrence_date IS NOT NULL
               AND next_recurrence_date <= ?1
             ORDER BY next_recurrence_date"
        ))?;
        let rows = stmt.query_map([now.to_rfc3339()], row_to_task)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Materialise the next occurrence of one template: insert the concrete
    /// task and advance the template's schedule, atomically.
    ///
    /// Returns `Ok(None)` when there is nothing to do: the slot was already
    /// taken by a racing tick, or the template's schedule moved on.
    #[instrument(skip(self), fields(template_id))]
    pub fn materialise_occurrence(
        &self,
        template_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>> {
        let now_str = now.to_rfc3339();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let template = tx
            .query_row(
                &format!("SELECT {TASK_COLS} FROM tasks WHERE id = ?1"),
                [template_id],
                row_to_task,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found(format!("task {template_id}")))?;

        // Recheck the slot inside the transaction: a racing tick may have
        // advanced the template between our read and this write.
        let slot = match template.next_recurrence_date {
            Some(s) if template.recurrence_pattern != RecurrencePattern::None && s <= now => s,
            _ => {
                debug!(template_id, "slot no longer due; skipping");
                return Ok(None);
            }
        };

        let next = next_occurrence(
            template.recurrence_pattern,
            template.recurrence_interval,
            slot,
        )
        .ok_or_else(|| {
            StoreError::invalid("recurrence", "template has no computable next occurrence")
        })?;

        let slot_str = slot.to_rfc3339();
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO tasks
             (user_id, title, description, is_completed, priority, due_date, category_id,
              recurrence_pattern, recurrence_interval, parent_recurrence_id, scheduled_for,
              notes, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, 'none', 1, ?7, ?8, ?9, ?10, ?10)",
            rusqlite::params![
                template.user_id,
                template.title,
                template.description,
                template.priority.to_string(),
                slot_str,
                template.category_id,
                template_id,
                slot_str,
                template.notes,
                now_str,
            ],
        )?;
        if inserted == 0 {
            // Unique (parent_recurrence_id, scheduled_for) hit: another tick
            // already produced this occurrence.
            warn!(template_id, slot = %slot_str, "occurrence already materialised");
            return Ok(None);
        }
        let new_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO tasks_fts(rowid, title, description) VALUES (?1, ?2, ?3)",
            rusqlite::params![new_id, template.title, template.description],
        )?;
        tx.execute(
            "INSERT INTO task_tags (task_id, tag_id)
             SELECT ?1, tag_id FROM task_tags WHERE task_id = ?2",
            rusqlite::params![new_id, template_id],
        )?;
        tx.execute(
            "UPDATE tasks SET next_recurrence_date = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![next.to_rfc3339(), now_str, template_id],
        )?;
        log_activity(
            &tx,
            &template.user_id,
            new_id,
            "materialised",
            json!({ "new": { "template_id": template_id, "scheduled_for": slot_str } }),
            &now_str,
        )?;
        tx.commit()?;

        info!(template_id, new_id, slot = %slot_str, "occurrence materialised");

        Ok(Some(Task {
            id: new_id,
            user_id: template.user_id,
            title: template.title,
            description: template.description,
            is_completed: false,
            priority: template.priority,
            due_date: Some(slot),
            category_id: template.category_id,
            recurrence_pattern: RecurrencePattern::None,
            recurrence_interval: 1,
            next_recurrence_date: None,
            parent_recurrence_id: Some(template_id),
            notes: template.notes,
            created_at: now,
            updated_at: now,
        }))
    }
}

// --- helpers ---------------------------------------------------------------

fn validate_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(StoreError::invalid("title", "must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(StoreError::invalid(
            "title",
            format!("must be at most {MAX_TITLE_CHARS} characters"),
        ));
    }
    Ok(title.to_string())
}

fn parse_due_date(raw: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    parse_natural_date(raw, now)
        .ok_or_else(|| StoreError::invalid("due_date", format!("unrecognised date: {raw}")))
}

/// Case-insensitive category lookup, creating the row when missing.
fn resolve_category(
    conn: &Connection,
    user_id: &str,
    name: &str,
    now_str: &str,
) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > 50 {
        return Err(StoreError::invalid("category", "must be 1..50 characters"));
    }
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM categories WHERE user_id = ?1 AND LOWER(name) = LOWER(?2)",
            rusqlite::params![user_id, name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO categories (user_id, name, created_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![user_id, name, now_str],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Lookup-or-create for a tag already in normal form.
fn resolve_tag(conn: &Connection, user_id: &str, name: &str) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM tags WHERE user_id = ?1 AND name = ?2",
            rusqlite::params![user_id, name],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO tags (user_id, name) VALUES (?1, ?2)",
        rusqlite::params![user_id, name],
    )?;
    Ok(conn.last_insert_rowid())
}

fn log_activity(
    conn: &Connection,
    user_id: &str,
    task_id: i64,
    action: &str,
    detail: serde_json::Value,
    now_str: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO activities (task_id, user_id, action, detail, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![task_id, user_id, action, detail.to_string(), now_str],
    )?;
    Ok(())
}

/// Quote every whitespace token so user text cannot inject FTS5 syntax.
fn fts_query(raw: &str) -> String {
    raw.split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

fn conv_err(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn req_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conv_err(idx, e.to_string()))
}

fn opt_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|d| Some(d.with_timezone(&Utc)))
            .map_err(|e| conv_err(idx, e.to_string())),
        None => Ok(None),
    }
}

/// Map a SQLite row (TASK_COLS order) to a `Task`.
fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let priority_s: String = row.get(5)?;
    let pattern_s: String = row.get(8)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        is_completed: row.get::<_, i64>(4)? != 0,
        priority: priority_s.parse().map_err(|e: String| conv_err(5, e))?,
        due_date: opt_ts(row, 6)?,
        category_id: row.get(7)?,
        recurrence_pattern: pattern_s.parse().map_err(|e: String| conv_err(8, e))?,
        recurrence_interval: row.get::<_, i64>(9)? as u32,
        next_recurrence_date: opt_ts(row, 10)?,
        parent_recurrence_id: row.get(11)?,
        notes: row.get(12)?,
        created_at: req_ts(row, 13)?,
        updated_at: req_ts(row, 14)?,
    })
}
