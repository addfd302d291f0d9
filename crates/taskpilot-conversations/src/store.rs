use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{ConversationError, Result};
use crate::types::{Conversation, MessageRole, StoredMessage};

/// Longest derived conversation title, in characters.
const MAX_TITLE_CHARS: usize = 60;

/// Thread-safe store for conversations and their messages.
///
/// Every operation carries the acting user's id; a conversation owned by
/// another user is reported as `NotFound`.
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    /// Open a store over `conn`, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create a conversation for `user_id`.
    ///
    /// The title is derived from `title_hint` (usually the first user
    /// message), truncated on a word boundary.
    #[instrument(skip(self, title_hint), fields(user_id))]
    pub fn create(
        &self,
        user_id: &str,
        title_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let id = Uuid::now_v7().to_string();
        let title = title_hint.map(derive_title);
        let now_str = now.to_rfc3339();

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversations (id, user_id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![id, user_id, title, now_str],
        )?;

        debug!(conversation_id = %id, "conversation created");
        Ok(Conversation {
            id,
            user_id: user_id.to_string(),
            title,
            created_at: now,
            updated_at: now,
        })
    }

    /// Fetch a conversation under the ownership predicate.
    pub fn get(&self, user_id: &str, conversation_id: &str) -> Result<Conversation> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, user_id, title, created_at, updated_at
             FROM conversations WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![conversation_id, user_id],
            row_to_conversation,
        )
        .optional()?
        .ok_or_else(|| ConversationError::NotFound {
            id: conversation_id.to_string(),
        })
    }

    /// Append a message and bump the conversation's `updated_at`.
    ///
    /// Timestamps within a conversation are kept non-decreasing: when the
    /// caller's clock reads earlier than the last stored message, the new
    /// row inherits the later time so window ordering never inverts.
    #[instrument(skip(self, content), fields(user_id, conversation_id, %role))]
    pub fn append_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;

        let owned: Option<String> = tx
            .query_row(
                "SELECT id FROM conversations WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![conversation_id, user_id],
                |row| row.get(0),
            )
            .optional()?;
        if owned.is_none() {
            return Err(ConversationError::NotFound {
                id: conversation_id.to_string(),
            });
        }

        let last: Option<String> = tx
            .query_row(
                "SELECT MAX(created_at) FROM messages WHERE conversation_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        let mut created_at = now.to_rfc3339();
        if let Some(last) = last {
            if created_at < last {
                created_at = last;
            }
        }

        tx.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![conversation_id, role.to_string(), content, created_at],
        )?;
        let message_id = tx.last_insert_rowid();

        tx.execute(
            "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![created_at, conversation_id],
        )?;
        tx.commit()?;

        Ok(message_id)
    }

    /// The last `limit` messages in ascending time order.
    pub fn recent_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>> {
        self.get(user_id, conversation_id)?;

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, role, content, created_at FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![conversation_id, limit as i64],
            row_to_message,
        )?;
        let mut messages: Vec<StoredMessage> = rows.collect::<rusqlite::Result<_>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Every message of the conversation, oldest first.
    pub fn all_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<StoredMessage>> {
        self.get(user_id, conversation_id)?;

        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, conversation_id, role, content, created_at FROM messages
             WHERE conversation_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([conversation_id], row_to_message)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// All conversations of a user, most recently updated first.
    pub fn list(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, user_id, title, created_at, updated_at FROM conversations
             WHERE user_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([user_id], row_to_conversation)?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Delete a conversation and its messages.
    #[instrument(skip(self), fields(user_id, conversation_id))]
    pub fn delete(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let changed = tx.execute(
            "DELETE FROM conversations WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![conversation_id, user_id],
        )?;
        if changed == 0 {
            return Err(ConversationError::NotFound {
                id: conversation_id.to_string(),
            });
        }
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            [conversation_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Truncate a message into a title, breaking on a word boundary.
fn derive_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_TITLE_CHARS {
        return trimmed.to_string();
    }
    let cut: String = trimmed.chars().take(MAX_TITLE_CHARS).collect();
    let head = match cut.rsplit_once(char::is_whitespace) {
        Some((head, _)) if !head.is_empty() => head,
        _ => cut.as_str(),
    };
    format!("{head}…")
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        created_at: ts(row, 3)?,
        updated_at: ts(row, 4)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role_s: String = row.get(2)?;
    let role = role_s.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: ts(row, 4)?,
    })
}

fn ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}
