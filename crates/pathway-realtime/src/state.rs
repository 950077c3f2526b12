//! Connectivity state and user-facing notices.

use serde::Serialize;

use crate::channel::Topic;

/// Connectivity of a topic (or the aggregate across topics).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    /// Live and delivering changes.
    Connected,
    /// Down; changes are not delivered.
    #[default]
    Disconnected,
    /// A reconnect attempt is in flight.
    Reconnecting,
}

impl ConnectionState {
    /// Ordering used for the aggregate: the worst state wins.
    fn severity(self) -> u8 {
        match self {
            Self::Connected => 0,
            Self::Reconnecting => 1,
            Self::Disconnected => 2,
        }
    }

    /// Aggregate several topic states. No topics means `Disconnected`.
    pub fn aggregate(states: impl IntoIterator<Item = Self>) -> Self {
        states
            .into_iter()
            .max_by_key(|s| s.severity())
            .unwrap_or(Self::Disconnected)
    }
}

/// Informational notices for the UI layer (toast, banner, ...).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ConnectionNotice {
    /// The topic went down.
    Lost {
        /// Affected topic.
        topic: Topic,
        /// Reason, as reported.
        reason: String,
    },
    /// A reconnect attempt started.
    Reconnecting {
        /// Affected topic.
        topic: Topic,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// The topic is live again.
    Restored {
        /// Affected topic.
        topic: Topic,
        /// Changes may have been missed while down; refetch to catch up.
        resync_required: bool,
    },
    /// Reconnect attempts were exhausted; the topic stays down.
    GaveUp {
        /// Affected topic.
        topic: Topic,
        /// Attempts made.
        attempts: u32,
    },
}

impl ConnectionNotice {
    /// Topic the notice is about.
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Lost { topic, .. }
            | Self::Reconnecting { topic, .. }
            | Self::Restored { topic, .. }
            | Self::GaveUp { topic, .. } => topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_empty_is_disconnected() {
        assert_eq!(
            ConnectionState::aggregate(std::iter::empty()),
            ConnectionState::Disconnected
        );
    }

    #[test]
    fn aggregate_worst_wins() {
        use ConnectionState::{Connected, Disconnected, Reconnecting};
        assert_eq!(ConnectionState::aggregate([Connected, Connected]), Connected);
        assert_eq!(
            ConnectionState::aggregate([Connected, Reconnecting]),
            Reconnecting
        );
        assert_eq!(
            ConnectionState::aggregate([Reconnecting, Disconnected, Connected]),
            Disconnected
        );
    }

    #[test]
    fn notice_topic_accessor() {
        let notice = ConnectionNotice::GaveUp {
            topic: Topic::new("t"),
            attempts: 3,
        };
        assert_eq!(notice.topic().as_str(), "t");
    }

    #[test]
    fn notice_serializes_with_type_tag() {
        let notice = ConnectionNotice::Restored {
            topic: Topic::new("t"),
            resync_required: true,
        };
        let value = serde_json::to_value(&notice).unwrap();
        assert_eq!(value["type"], "restored");
        assert_eq!(value["topic"], "t");
        assert_eq!(value["resyncRequired"], true);
        assert!(value.get("resync_required").is_none());
    }
}
