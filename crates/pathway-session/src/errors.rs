//! Auth API error types.

/// Failures reported by the Data Service auth API.
///
/// A failed refresh is retried on the next heartbeat; it is escalated only
/// when expiry is actually observed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    /// Request never reached the Data Service or timed out in transit.
    #[error("network error: {0}")]
    Network(String),

    /// The refresh token was rejected.
    #[error("invalid refresh token: {0}")]
    InvalidToken(String),

    /// The Data Service answered with an error.
    #[error("auth service error ({status}): {message}")]
    Service {
        /// HTTP-style status code.
        status: u16,
        /// Message from the service.
        message: String,
    },
}

impl RefreshError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::InvalidToken(_) => "invalid_token",
            Self::Service { .. } => "service",
        }
    }

    /// Whether retrying later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::InvalidToken(_) => false,
            Self::Service { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_and_kind() {
        let err = RefreshError::Service {
            status: 503,
            message: "down".into(),
        };
        assert_eq!(err.to_string(), "auth service error (503): down");
        assert_eq!(err.error_kind(), "service");
        assert_eq!(RefreshError::Network("x".into()).error_kind(), "network");
    }

    #[test]
    fn transient_classification() {
        assert!(RefreshError::Network("reset".into()).is_transient());
        assert!(!RefreshError::InvalidToken("revoked".into()).is_transient());
        assert!(
            RefreshError::Service {
                status: 429,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !RefreshError::Service {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
    }
}
