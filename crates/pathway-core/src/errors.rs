//! Core error types.

use chrono::{DateTime, Utc};

/// Errors raised while constructing core values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// A session record whose expiry is not after its issue time.
    #[error("invalid session record: expires_at {expires_at} is not after issued_at {issued_at}")]
    InvalidSession {
        /// When the session was issued.
        issued_at: DateTime<Utc>,
        /// When the session expires.
        expires_at: DateTime<Utc>,
    },

    /// A row filter expression that could not be parsed.
    #[error("invalid row filter: {0}")]
    InvalidFilter(String),
}

impl CoreError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidSession { .. } => "invalid_session",
            Self::InvalidFilter(_) => "invalid_filter",
        }
    }
}

/// Chat message metadata that does not match any known shape.
///
/// Never propagated past the ingestion boundary: the progress tracker
/// treats it as "no update".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed message metadata field `{field}`: {reason}")]
pub struct MalformedMessage {
    /// Offending metadata field.
    pub field: String,
    /// What was wrong with it.
    pub reason: String,
}

impl MalformedMessage {
    /// Build a malformed-metadata error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
