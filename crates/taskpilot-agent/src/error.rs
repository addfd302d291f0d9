use thiserror::Error;

/// Errors visible at the core boundary.
///
/// Validation and not-found conditions are normally absorbed into assistant
/// text before they get here; the unavailability variants carry the
/// conversation id and the user-facing apology that was (or would have
/// been) persisted, so the framing layer can pick a retryable status
/// without losing the transcript. None of these embed internal detail.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("language model unavailable")]
    LlmUnavailable {
        conversation_id: String,
        assistant_text: String,
    },

    #[error("storage unavailable")]
    StorageUnavailable {
        conversation_id: Option<String>,
        assistant_text: String,
    },
}

pub type Result<T> = std::result::Result<T, AgentError>;
