//! Data Service channel boundary.

use std::fmt;

use async_trait::async_trait;
use pathway_core::{ChannelId, TableChange, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::errors::ConnectionError;

/// Name of a long-lived subscription endpoint.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Arbitrary named topic.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Global connection-status topic.
    pub fn connection_status() -> Self {
        Self::new("connection-status")
    }

    /// Per-user bookmark changes.
    pub fn bookmarks(user_id: &UserId) -> Self {
        Self(format!("bookmarks:{user_id}"))
    }

    /// Topic name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Events pushed over an open channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// The channel library lost its connection.
    Disconnected {
        /// Library-supplied reason.
        reason: String,
    },
    /// The channel library restored its connection on its own.
    Reconnected,
    /// A row changed.
    Change(TableChange),
}

/// A channel accepted by the Data Service.
#[derive(Debug)]
pub struct OpenedChannel {
    /// Identifier used for `remove_channel`.
    pub id: ChannelId,
    /// Event stream; closing it counts as an unexpected disconnect.
    pub events: mpsc::Receiver<ChannelEvent>,
}

/// Channel operations provided by the Data Service client library.
#[async_trait]
pub trait ChannelApi: Send + Sync {
    /// Open a channel for `topic`.
    async fn open_channel(&self, topic: &Topic) -> Result<OpenedChannel, ConnectionError>;

    /// Tear down a channel. Unknown IDs are ignored.
    async fn remove_channel(&self, channel: &ChannelId);
}
