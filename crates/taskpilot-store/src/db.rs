use rusqlite::Connection;

use crate::error::Result;

/// Initialise the task tables and the FTS index.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS categories (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     TEXT NOT NULL,
            name        TEXT NOT NULL,
            color       TEXT NOT NULL DEFAULT '#6b7280',
            icon        TEXT NOT NULL DEFAULT '',
            created_at  TEXT NOT NULL,
            UNIQUE(user_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_categories_user
            ON categories(user_id);

        CREATE TABLE IF NOT EXISTS tasks (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id              TEXT NOT NULL,
            title                TEXT NOT NULL,
            description          TEXT,
            is_completed         INTEGER NOT NULL DEFAULT 0,
            priority             TEXT NOT NULL DEFAULT 'medium',
            due_date             TEXT,
            category_id          INTEGER,
            recurrence_pattern   TEXT NOT NULL DEFAULT 'none',
            recurrence_interval  INTEGER NOT NULL DEFAULT 1,
            next_recurrence_date TEXT,
            parent_recurrence_id INTEGER,
            scheduled_for        TEXT,   -- occurrence slot for materialised tasks
            notes                TEXT,
            created_at           TEXT NOT NULL,
            updated_at           TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_user
            ON tasks(user_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_tasks_due_templates
            ON tasks(next_recurrence_date)
            WHERE recurrence_pattern != 'none';
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_occurrence
            ON tasks(parent_recurrence_id, scheduled_for)
            WHERE parent_recurrence_id IS NOT NULL;

        CREATE TABLE IF NOT EXISTS tags (
            id       INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id  TEXT NOT NULL,
            name     TEXT NOT NULL,
            UNIQUE(user_id, name)
        );

        CREATE TABLE IF NOT EXISTS task_tags (
            task_id  INTEGER NOT NULL,
            tag_id   INTEGER NOT NULL,
            PRIMARY KEY (task_id, tag_id)
        );
        CREATE INDEX IF NOT EXISTS idx_task_tags_tag
            ON task_tags(tag_id);

        CREATE TABLE IF NOT EXISTS subtasks (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id       INTEGER NOT NULL,
            title         TEXT NOT NULL,
            is_completed  INTEGER NOT NULL DEFAULT 0,
            sort_order    INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_subtasks_task
            ON subtasks(task_id, sort_order);

        CREATE TABLE IF NOT EXISTS activities (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id     INTEGER NOT NULL,
            user_id     TEXT NOT NULL,
            action      TEXT NOT NULL,
            detail      TEXT,   -- JSON old/new snapshot
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_activities_task
            ON activities(task_id, created_at);",
    )?;
    create_fts_index(conn)?;
    Ok(())
}

/// FTS5 virtual table for full-text search across task titles and
/// descriptions. content='tasks' makes it an external-content table;
/// we sync manually on write.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS tasks_fts
            USING fts5(title, description, content='tasks', content_rowid='id');",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='tasks'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(n, 1);
    }
}
