//! Authentication session record.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::ids::UserId;

/// An authenticated session issued by the Data Service.
///
/// Immutable once built: a refresh produces a new record that replaces the
/// old one wholesale. `expires_at > issued_at` holds for every value,
/// including ones deserialized from JSON.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSessionRecord")]
pub struct SessionRecord {
    user_id: UserId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    refresh_token: String,
}

impl SessionRecord {
    /// Build a record, rejecting one that expires at or before issue time.
    pub fn new(
        user_id: UserId,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        refresh_token: impl Into<String>,
    ) -> Result<Self, CoreError> {
        if expires_at <= issued_at {
            return Err(CoreError::InvalidSession {
                issued_at,
                expires_at,
            });
        }
        Ok(Self {
            user_id,
            issued_at,
            expires_at,
            refresh_token: refresh_token.into(),
        })
    }

    /// Build a record issued at `issued_at` that lives for `ttl`.
    pub fn with_ttl(
        user_id: UserId,
        issued_at: DateTime<Utc>,
        ttl: Duration,
        refresh_token: impl Into<String>,
    ) -> Result<Self, CoreError> {
        Self::new(user_id, issued_at, issued_at + ttl, refresh_token)
    }

    /// Owner of the session.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Issue time.
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Expiry time.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Opaque refresh token, handed back to the Data Service on refresh.
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Signed time until expiry; zero or negative once expired.
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// Time until expiry, saturating at zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        self.time_until_expiry(now).to_std().unwrap_or_default()
    }

    /// Whether the session is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_until_expiry(now) <= Duration::zero()
    }
}

impl fmt::Debug for SessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRecord")
            .field("user_id", &self.user_id)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Unvalidated wire form.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSessionRecord {
    user_id: UserId,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    refresh_token: String,
}

impl TryFrom<RawSessionRecord> for SessionRecord {
    type Error = CoreError;

    fn try_from(raw: RawSessionRecord) -> Result<Self, Self::Error> {
        Self::new(raw.user_id, raw.issued_at, raw.expires_at, raw.refresh_token)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn new_accepts_valid_record() {
        let rec = SessionRecord::with_ttl(UserId::from_raw("u1"), t0(), Duration::hours(1), "r")
            .unwrap();
        assert_eq!(rec.user_id().as_str(), "u1");
        assert_eq!(rec.expires_at(), t0() + Duration::hours(1));
        assert_eq!(rec.refresh_token(), "r");
    }

    #[test]
    fn new_rejects_expiry_equal_to_issue() {
        let err = SessionRecord::new(UserId::new(), t0(), t0(), "r").unwrap_err();
        assert_matches!(err, CoreError::InvalidSession { .. });
    }

    #[test]
    fn new_rejects_expiry_before_issue() {
        let err =
            SessionRecord::new(UserId::new(), t0(), t0() - Duration::seconds(1), "r").unwrap_err();
        assert_matches!(err, CoreError::InvalidSession { .. });
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let rec = SessionRecord::with_ttl(UserId::new(), t0(), Duration::minutes(10), "r").unwrap();
        assert_eq!(
            rec.remaining(t0()),
            std::time::Duration::from_secs(600)
        );
        assert_eq!(
            rec.remaining(t0() + Duration::hours(1)),
            std::time::Duration::ZERO
        );
        assert!(rec.is_expired(t0() + Duration::minutes(10)));
        assert!(!rec.is_expired(t0() + Duration::minutes(9)));
    }

    #[test]
    fn debug_redacts_refresh_token() {
        let rec =
            SessionRecord::with_ttl(UserId::new(), t0(), Duration::hours(1), "super-secret").unwrap();
        let debug = format!("{rec:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn deserialize_validates_invariant() {
        let json = serde_json::json!({
            "userId": "u1",
            "issuedAt": "2026-01-01T00:00:00Z",
            "expiresAt": "2025-12-31T00:00:00Z",
            "refreshToken": "r",
        });
        assert!(serde_json::from_value::<SessionRecord>(json).is_err());
    }

    #[test]
    fn serde_uses_camel_case() {
        let rec = SessionRecord::with_ttl(UserId::from_raw("u1"), t0(), Duration::hours(1), "r")
            .unwrap();
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["userId"], "u1");
        assert!(value.get("expiresAt").is_some());
        let back: SessionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, rec);
    }
}
