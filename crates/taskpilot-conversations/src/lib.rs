//! `taskpilot-conversations` — dumb transcript storage.
//!
//! A conversation is a user-owned, ordered list of messages. The store
//! knows nothing about the LLM; it persists turns and serves a recent
//! window for prompt building.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ConversationError, Result};
pub use store::ConversationStore;
pub use types::{Conversation, MessageRole, StoredMessage};
