//! Data Service auth boundary.

use async_trait::async_trait;
use pathway_core::SessionRecord;

use crate::errors::RefreshError;

/// Auth operations provided by the Data Service client library.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// The persisted session, if the user is signed in.
    async fn get_session(&self) -> Result<Option<SessionRecord>, RefreshError>;

    /// Exchange `current`'s refresh token for a new session.
    async fn refresh_session(&self, current: &SessionRecord) -> Result<SessionRecord, RefreshError>;

    /// End the session on the server.
    async fn sign_out(&self) -> Result<(), RefreshError>;
}

/// Auth state notifications pushed by the Data Service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    /// A user signed in.
    SignedIn(SessionRecord),
    /// The library refreshed the session on its own.
    TokenRefreshed(SessionRecord),
    /// The user signed out (possibly in another tab).
    SignedOut,
    /// The Data Service no longer accepts the session.
    SessionInvalid,
}
