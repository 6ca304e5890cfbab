// Errors surfaced to callers of the tracker

use thiserror::Error;

/// Errors from tracker operations.
///
/// A missing task is not an error: lookups return `Option` and mutations
/// return `bool`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// A required field was absent from the payload.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The description was empty or whitespace-only.
    #[error("Description cannot be empty")]
    EmptyDescription,

    /// A reference ticket list was supplied without any tickets.
    #[error("reference_tickets must contain at least one ticket")]
    EmptyReferenceTickets,

    /// A timestamp did not parse and the strict policy is active.
    #[error("Invalid {field}: {reason}")]
    InvalidTimestamp { field: &'static str, reason: String },

    /// End time precedes start time and ordering is enforced.
    #[error("end_time ({end}) precedes start_time ({start})")]
    EndBeforeStart { start: i64, end: i64 },

    /// The storage backend failed; details are logged, not returned.
    #[error("Storage backend unavailable")]
    Unavailable,
}

impl TaskError {
    /// True for errors caused by the request itself rather than the backend
    pub fn is_validation(&self) -> bool {
        !matches!(self, TaskError::Unavailable)
    }
}
