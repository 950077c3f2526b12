//! Observable session state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pathway_core::UserId;
use serde::Serialize;

use crate::errors::RefreshError;

/// Coordinator lifecycle.
///
/// `NoSession -> Active -> Refreshing -> Active`, and
/// `Active -> Expired` once expiry is observed. `Expired` lasts until the
/// next `set_session`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    /// Logged out.
    #[default]
    NoSession,
    /// Holding a live session.
    Active,
    /// A refresh request is in flight.
    Refreshing,
    /// Expiry was observed; the user has been logged out.
    Expired,
}

/// Snapshot published on every phase or record change.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Current phase.
    pub phase: SessionPhase,
    /// Session owner, when a session is held.
    pub user_id: Option<UserId>,
    /// Expiry of the held session.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    /// Whether a usable session is held.
    pub fn is_signed_in(&self) -> bool {
        matches!(self.phase, SessionPhase::Active | SessionPhase::Refreshing)
    }
}

/// One-off session events for the UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionSignal {
    /// Less than the warning threshold remains.
    ExpiryWarning {
        /// Time left.
        remaining: Duration,
    },
    /// A refresh request started.
    Refreshing,
    /// The session was replaced by a refreshed one.
    Refreshed {
        /// New expiry.
        expires_at: DateTime<Utc>,
    },
    /// A refresh failed; the old session is kept and retried next tick.
    RefreshFailed {
        /// What went wrong.
        error: RefreshError,
    },
    /// Expiry was observed and the user logged out.
    Expired,
    /// The Data Service reported the session invalid.
    Invalidated,
    /// The session was cleared.
    SignedOut,
}
