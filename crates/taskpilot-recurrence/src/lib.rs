//! `taskpilot-recurrence` — materialisation of recurring tasks.
//!
//! # Overview
//!
//! Recurring tasks are stored as templates: real task rows whose
//! `recurrence_pattern` is not `none` and whose `next_recurrence_date`
//! names the next occurrence slot. The [`engine::MaterialiserEngine`]
//! sweeps due templates at a fixed cadence and, per template and in one
//! transaction, inserts the concrete occurrence and advances the slot by
//! exactly one interval. A failure on one template never stops the sweep,
//! and a unique slot index makes racing ticks idempotent.

pub mod engine;

pub use engine::{MaterialiserEngine, TickReport};
