//! `taskpilot-store` — user-scoped task persistence over SQLite.
//!
//! # Overview
//!
//! [`TaskStore`] wraps a single SQLite connection and is the only component
//! that issues SQL against the task tables. Every operation takes the acting
//! user's id and applies it as a predicate; a row owned by another user is
//! indistinguishable from a missing row (`NotFound`, never a permission
//! error).
//!
//! Natural-text structure is resolved here before persistence: `#tag`
//! tokens become tag links, trailing `daily`/`weekly`/`monthly` keywords
//! become recurrence fields, and free-form due-date phrases go through
//! [`natural_date::parse_natural_date`].
//!
//! Search runs over an FTS5 external-content index on title + description,
//! title weighted above description, kept in sync manually on every write.

pub mod db;
pub mod error;
pub mod natural_date;
pub mod parse;
pub mod schedule;
pub mod tasks;
pub mod types;

pub use error::{Result, StoreError};
pub use tasks::TaskStore;
pub use types::{
    Category, DueFilter, NewTask, Priority, RecurrencePattern, RecurrenceSpec, SortKey,
    StatusFilter, Subtask, Tag, Task, TaskDigest, TaskFilter, TaskPatch,
};
