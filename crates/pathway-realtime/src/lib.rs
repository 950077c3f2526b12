//! # pathway-realtime
//!
//! Live-update channel management for the Pathway client core.
//!
//! - [`RealtimeConnectionManager`]: one logical channel per [`Topic`],
//!   connectivity tracking, reconnect with backoff, change fan-out
//! - [`SubscriptionRegistry`]: per-table listeners delivered in registration order
//! - [`BookmarkCache`]: a consumer that resyncs by full refetch after a reconnect
//! - [`ChannelApi`]: the Data Service boundary, implemented outside this crate
//!
//! Change notifications are not buffered while a channel is down. Every
//! [`ConnectionNotice::Restored`] tells consumers whether they may have
//! missed events so they can refetch.

#![deny(unsafe_code)]

pub mod backoff;
pub mod bookmarks;
pub mod channel;
pub mod errors;
pub mod manager;
pub mod state;
pub mod subscription;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use bookmarks::{BookmarkCache, BookmarkSource};
pub use channel::{ChannelApi, ChannelEvent, OpenedChannel, Topic};
pub use errors::ConnectionError;
pub use manager::{ConnectionHandle, RealtimeConnectionManager};
pub use state::{ConnectionNotice, ConnectionState};
pub use subscription::{ChangeCallback, SubscriptionGuard, SubscriptionHandle, SubscriptionRegistry};
