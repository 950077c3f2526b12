//! Connection error types.

/// Failures of the live-update channel.
///
/// Never fatal: the manager recovers by scheduling a reconnect and reports
/// progress through [`crate::ConnectionNotice`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// The Data Service refused to open the channel.
    #[error("channel `{topic}` rejected: {reason}")]
    Rejected {
        /// Topic that was refused.
        topic: String,
        /// Reason given by the Data Service.
        reason: String,
    },

    /// The backend could not be reached at all.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// An open channel went away unexpectedly.
    #[error("channel `{topic}` dropped: {reason}")]
    Dropped {
        /// Topic of the dropped channel.
        topic: String,
        /// Reason reported by the channel library.
        reason: String,
    },

    /// A row fetch used for resynchronisation failed.
    #[error("fetch failed: {0}")]
    Fetch(String),
}

impl ConnectionError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::Unreachable(_) => "unreachable",
            Self::Dropped { .. } => "dropped",
            Self::Fetch(_) => "fetch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_display() {
        let err = ConnectionError::Rejected {
            topic: "bookmarks:u1".into(),
            reason: "forbidden".into(),
        };
        assert_eq!(err.to_string(), "channel `bookmarks:u1` rejected: forbidden");
        assert_eq!(err.error_kind(), "rejected");
    }

    #[test]
    fn unreachable_display() {
        let err = ConnectionError::Unreachable("dns".into());
        assert_eq!(err.to_string(), "backend unreachable: dns");
        assert_eq!(err.error_kind(), "unreachable");
    }

    #[test]
    fn dropped_kind() {
        let err = ConnectionError::Dropped {
            topic: "t".into(),
            reason: "eof".into(),
        };
        assert_eq!(err.error_kind(), "dropped");
    }
}
