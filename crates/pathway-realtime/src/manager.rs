//! Realtime connection manager.
//!
//! Owns one logical channel per [`Topic`]. Each open channel gets an event
//! pump task; unexpected disconnects schedule reconnect attempts with
//! exponential backoff. Every background task holds a `Weak` reference and a
//! [`CancellationToken`] derived from its topic's token, so `close` (or
//! dropping the last manager clone) stops them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pathway_core::{ChannelId, RowFilter};
use pathway_settings::RealtimeSettings;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backoff::reconnect_delay;
use crate::channel::{ChannelApi, ChannelEvent, OpenedChannel, Topic};
use crate::errors::ConnectionError;
use crate::state::{ConnectionNotice, ConnectionState};
use crate::subscription::{ChangeCallback, SubscriptionGuard, SubscriptionHandle, SubscriptionRegistry};

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

struct TopicShared {
    topic: Topic,
    state: Mutex<ConnectionState>,
    channel: Mutex<Option<ChannelId>>,
}

/// Logical channel for one topic.
///
/// Stays the same across reconnects; the underlying [`ChannelId`] changes.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<TopicShared>,
}

impl ConnectionHandle {
    fn new(topic: Topic) -> Self {
        Self {
            shared: Arc::new(TopicShared {
                topic,
                state: Mutex::new(ConnectionState::Disconnected),
                channel: Mutex::new(None),
            }),
        }
    }

    /// Topic of this channel.
    pub fn topic(&self) -> &Topic {
        &self.shared.topic
    }

    /// Current connectivity.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.lock()
    }

    /// Current underlying channel, if one is open.
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.shared.channel.lock().clone()
    }

    /// Whether both handles refer to the same logical channel.
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.shared.state.lock(), state)
    }

    fn set_channel(&self, channel: Option<ChannelId>) -> Option<ChannelId> {
        std::mem::replace(&mut *self.shared.channel.lock(), channel)
    }

    fn owns_channel(&self, channel: &ChannelId) -> bool {
        self.shared.channel.lock().as_ref() == Some(channel)
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("topic", &self.shared.topic)
            .field("state", &self.state())
            .field("channel", &self.channel_id())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

struct TopicEntry {
    handle: ConnectionHandle,
    /// Cancelled on `close`; parent of every other token below.
    topic_token: CancellationToken,
    /// Current event pump.
    channel_token: CancellationToken,
    /// Pending reconnect task, if any.
    reconnect: Option<CancellationToken>,
    /// Changes may have been dropped since the topic was last connected.
    /// Also set when the first open fails, since subscribers may already be
    /// waiting on the topic.
    missed: bool,
}

impl TopicEntry {
    fn new(handle: ConnectionHandle) -> Self {
        let topic_token = CancellationToken::new();
        let channel_token = topic_token.child_token();
        Self {
            handle,
            topic_token,
            channel_token,
            reconnect: None,
            missed: false,
        }
    }
}

struct Inner {
    api: Arc<dyn ChannelApi>,
    settings: RealtimeSettings,
    topics: tokio::sync::Mutex<HashMap<Topic, TopicEntry>>,
    subscriptions: Arc<SubscriptionRegistry>,
    state_tx: watch::Sender<ConnectionState>,
    notices: broadcast::Sender<ConnectionNotice>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for entry in self.topics.get_mut().values() {
            entry.topic_token.cancel();
        }
    }
}

/// Maintains live-update channels and fans out table changes.
///
/// Cheap to clone; all clones share the same channels.
#[derive(Clone)]
pub struct RealtimeConnectionManager {
    inner: Arc<Inner>,
}

impl RealtimeConnectionManager {
    /// Create a manager over the given channel API.
    pub fn new(api: Arc<dyn ChannelApi>, settings: RealtimeSettings) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (notices, _) = broadcast::channel(settings.notice_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                api,
                settings,
                topics: tokio::sync::Mutex::new(HashMap::new()),
                subscriptions: Arc::new(SubscriptionRegistry::new()),
                state_tx,
                notices,
            }),
        }
    }

    /// Open the channel for `topic`, or return the one already open.
    ///
    /// On rejection the topic is still tracked: it moves to `Disconnected`,
    /// a background reconnect is scheduled, and the error is returned for
    /// information only.
    #[tracing::instrument(skip_all, fields(topic = %topic))]
    pub async fn open(&self, topic: Topic) -> Result<ConnectionHandle, ConnectionError> {
        let inner = &self.inner;
        let mut topics = inner.topics.lock().await;

        if let Some(entry) = topics.get_mut(&topic) {
            debug!("topic already open, reusing channel");
            if entry.handle.state() == ConnectionState::Disconnected && entry.reconnect.is_none() {
                inner.schedule_reconnect(&topic, entry);
            }
            return Ok(entry.handle.clone());
        }

        let handle = ConnectionHandle::new(topic.clone());
        let mut entry = TopicEntry::new(handle.clone());

        match inner.api.open_channel(&topic).await {
            Ok(opened) => {
                inner.install_channel(&mut entry, opened);
                let _ = topics.insert(topic.clone(), entry);
                inner.publish_aggregate(&topics);
                info!("channel opened");
                Ok(handle)
            }
            Err(err) => {
                warn!(error = %err, kind = err.error_kind(), "failed to open channel, scheduling reconnect");
                entry.missed = true;
                inner.schedule_reconnect(&topic, &mut entry);
                let _ = topics.insert(topic.clone(), entry);
                inner.publish_aggregate(&topics);
                drop(topics);
                let _ = inner.notices.send(ConnectionNotice::Lost {
                    topic,
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Tear down the channel for `topic` and cancel any pending reconnect.
    ///
    /// No-op if the topic is not open.
    #[tracing::instrument(skip_all, fields(topic = %topic))]
    pub async fn close(&self, topic: &Topic) {
        let entry = {
            let mut topics = self.inner.topics.lock().await;
            let entry = topics.remove(topic);
            self.inner.publish_aggregate(&topics);
            entry
        };
        let Some(entry) = entry else {
            debug!("close on unknown topic ignored");
            return;
        };

        entry.topic_token.cancel();
        let _ = entry.handle.set_state(ConnectionState::Disconnected);
        if let Some(channel) = entry.handle.set_channel(None) {
            self.inner.api.remove_channel(&channel).await;
        }
        info!("channel closed");
    }

    /// Close every topic.
    pub async fn shutdown(&self) {
        let topics: Vec<Topic> = self.inner.topics.lock().await.keys().cloned().collect();
        for topic in &topics {
            self.close(topic).await;
        }
    }

    /// Restart reconnect attempts for a topic that gave up.
    ///
    /// Returns `false` if the topic is unknown or not disconnected.
    pub async fn reconnect(&self, topic: &Topic) -> bool {
        let mut topics = self.inner.topics.lock().await;
        let Some(entry) = topics.get_mut(topic) else {
            return false;
        };
        if entry.handle.state() != ConnectionState::Disconnected || entry.reconnect.is_some() {
            return false;
        }
        self.inner.schedule_reconnect(topic, entry);
        true
    }

    /// Register a listener for changes to `table`.
    ///
    /// Delivery starts once a channel carrying the table is connected.
    pub fn subscribe(
        &self,
        table: impl Into<String>,
        filter: RowFilter,
        callback: ChangeCallback,
    ) -> SubscriptionHandle {
        self.inner.subscriptions.subscribe(table, filter, callback)
    }

    /// Like [`Self::subscribe`], but unsubscribes when the guard drops.
    pub fn subscribe_scoped(
        &self,
        table: impl Into<String>,
        filter: RowFilter,
        callback: ChangeCallback,
    ) -> SubscriptionGuard {
        let handle = self.subscribe(table, filter, callback);
        SubscriptionGuard::new(&self.inner.subscriptions, handle)
    }

    /// Remove a listener. Idempotent.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let _ = self.inner.subscriptions.unsubscribe(handle);
    }

    /// Listener registry (read access for diagnostics).
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    /// State of one topic, if tracked.
    pub async fn topic_state(&self, topic: &Topic) -> Option<ConnectionState> {
        self.inner
            .topics
            .lock()
            .await
            .get(topic)
            .map(|e| e.handle.state())
    }

    /// Number of tracked topics.
    pub async fn topic_count(&self) -> usize {
        self.inner.topics.lock().await.len()
    }

    /// Aggregate connectivity (worst state across topics).
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Observe aggregate connectivity.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Observe user-facing notices.
    pub fn notices(&self) -> broadcast::Receiver<ConnectionNotice> {
        self.inner.notices.subscribe()
    }
}

impl Inner {
    fn publish_aggregate(&self, topics: &HashMap<Topic, TopicEntry>) {
        let aggregate = ConnectionState::aggregate(topics.values().map(|e| e.handle.state()));
        let _ = self.state_tx.send_if_modified(|current| {
            if *current == aggregate {
                false
            } else {
                *current = aggregate;
                true
            }
        });
    }

    /// Make `opened` the topic's live channel and start its pump.
    fn install_channel(self: &Arc<Self>, entry: &mut TopicEntry, opened: OpenedChannel) {
        entry.channel_token.cancel();
        entry.channel_token = entry.topic_token.child_token();
        entry.missed = false;
        let _ = entry.handle.set_channel(Some(opened.id.clone()));
        let _ = entry.handle.set_state(ConnectionState::Connected);
        self.spawn_pump(entry.handle.clone(), opened, entry.channel_token.clone());
    }

    fn spawn_pump(self: &Arc<Self>, handle: ConnectionHandle, opened: OpenedChannel, token: CancellationToken) {
        let weak = Arc::downgrade(self);
        let OpenedChannel { id, mut events } = opened;

        drop(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    () = token.cancelled() => break,
                    event = events.recv() => event,
                };
                let Some(inner) = weak.upgrade() else { break };
                match event {
                    Some(ChannelEvent::Change(change)) => {
                        if handle.state() == ConnectionState::Connected {
                            let delivered = inner.subscriptions.dispatch(&change);
                            trace!(table = %change.table, delivered, "change dispatched");
                        } else {
                            trace!(table = %change.table, "change dropped while disconnected");
                        }
                    }
                    Some(ChannelEvent::Disconnected { reason }) => {
                        inner.on_disconnect(handle.topic(), &id, reason).await;
                    }
                    Some(ChannelEvent::Reconnected) => {
                        inner.on_native_reconnect(handle.topic(), &id).await;
                    }
                    None => {
                        inner
                            .on_disconnect(handle.topic(), &id, "event stream closed".to_string())
                            .await;
                        break;
                    }
                }
            }
            trace!(channel = %id, "event pump stopped");
        }));
    }

    async fn on_disconnect(self: &Arc<Self>, topic: &Topic, channel: &ChannelId, reason: String) {
        let mut topics = self.topics.lock().await;
        let Some(entry) = topics.get_mut(topic) else {
            return;
        };
        if !entry.handle.owns_channel(channel) {
            return;
        }

        let was_connected =
            entry.handle.set_state(ConnectionState::Disconnected) == ConnectionState::Connected;
        entry.missed = true;
        if entry.reconnect.is_none() {
            self.schedule_reconnect(topic, entry);
        }
        self.publish_aggregate(&topics);
        drop(topics);

        if was_connected {
            let err = ConnectionError::Dropped {
                topic: topic.to_string(),
                reason: reason.clone(),
            };
            warn!(topic = %topic, error = %err, "connection lost");
            let _ = self.notices.send(ConnectionNotice::Lost {
                topic: topic.clone(),
                reason,
            });
        }
    }

    async fn on_native_reconnect(self: &Arc<Self>, topic: &Topic, channel: &ChannelId) {
        let mut topics = self.topics.lock().await;
        let Some(entry) = topics.get_mut(topic) else {
            return;
        };
        if !entry.handle.owns_channel(channel) {
            return;
        }
        if let Some(pending) = entry.reconnect.take() {
            pending.cancel();
        }
        let previous = entry.handle.set_state(ConnectionState::Connected);
        let resync_required = std::mem::take(&mut entry.missed);
        self.publish_aggregate(&topics);
        drop(topics);

        if previous != ConnectionState::Connected {
            info!(topic = %topic, resync_required, "connection restored by channel");
            let _ = self.notices.send(ConnectionNotice::Restored {
                topic: topic.clone(),
                resync_required,
            });
        }
    }

    fn schedule_reconnect(self: &Arc<Self>, topic: &Topic, entry: &mut TopicEntry) {
        let token = entry.topic_token.child_token();
        entry.reconnect = Some(token.clone());

        let weak: Weak<Self> = Arc::downgrade(self);
        let settings = self.settings.clone();
        let topic = topic.clone();
        debug!(topic = %topic, max_attempts = settings.max_reconnect_attempts, "reconnect scheduled");

        drop(tokio::spawn(async move {
            for attempt in 0..settings.max_reconnect_attempts {
                let delay = reconnect_delay(attempt, &settings);
                tokio::select! {
                    () = token.cancelled() => return,
                    () = tokio::time::sleep(delay) => {}
                }
                let Some(inner) = weak.upgrade() else { return };
                if inner.try_reconnect(&topic, attempt + 1, &token).await {
                    return;
                }
            }
            if let Some(inner) = weak.upgrade() {
                inner
                    .give_up(&topic, settings.max_reconnect_attempts, &token)
                    .await;
            }
        }));
    }

    /// One reconnect attempt. Returns `true` when no further attempts are
    /// needed (connected, closed, or superseded).
    async fn try_reconnect(self: &Arc<Self>, topic: &Topic, attempt: u32, token: &CancellationToken) -> bool {
        {
            let mut topics = self.topics.lock().await;
            let Some(entry) = topics.get_mut(topic) else {
                return true;
            };
            if token.is_cancelled() {
                return true;
            }
            let _ = entry.handle.set_state(ConnectionState::Reconnecting);
            self.publish_aggregate(&topics);
        }
        debug!(topic = %topic, attempt, "reconnect attempt");
        let _ = self.notices.send(ConnectionNotice::Reconnecting {
            topic: topic.clone(),
            attempt,
        });

        let result = self.api.open_channel(topic).await;

        let mut topics = self.topics.lock().await;
        if token.is_cancelled() || !topics.contains_key(topic) {
            drop(topics);
            if let Ok(opened) = result {
                self.api.remove_channel(&opened.id).await;
            }
            return true;
        }
        let Some(entry) = topics.get_mut(topic) else {
            return true;
        };

        match result {
            Ok(opened) => {
                let stale = entry.handle.channel_id();
                let resync_required = entry.missed;
                entry.reconnect = None;
                self.install_channel(entry, opened);
                self.publish_aggregate(&topics);
                drop(topics);

                if let Some(stale) = stale {
                    self.api.remove_channel(&stale).await;
                }
                info!(topic = %topic, attempt, resync_required, "connection restored");
                let _ = self.notices.send(ConnectionNotice::Restored {
                    topic: topic.clone(),
                    resync_required,
                });
                true
            }
            Err(err) => {
                let _ = entry.handle.set_state(ConnectionState::Disconnected);
                self.publish_aggregate(&topics);
                warn!(topic = %topic, attempt, error = %err, kind = err.error_kind(), "reconnect attempt failed");
                false
            }
        }
    }

    async fn give_up(&self, topic: &Topic, attempts: u32, token: &CancellationToken) {
        let mut topics = self.topics.lock().await;
        if token.is_cancelled() {
            return;
        }
        let Some(entry) = topics.get_mut(topic) else {
            return;
        };
        entry.reconnect = None;
        drop(topics);
        warn!(topic = %topic, attempts, "giving up on reconnect");
        let _ = self.notices.send(ConnectionNotice::GaveUp {
            topic: topic.clone(),
            attempts,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeChannelApi;
    use assert_matches::assert_matches;
    use pathway_core::{ChangeKind, ChangePayload, TableChange};
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn settings() -> RealtimeSettings {
        RealtimeSettings {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 1_000,
            max_reconnect_attempts: 3,
            jitter_factor: 0.0,
            notice_capacity: 64,
        }
    }

    fn setup() -> (Arc<FakeChannelApi>, RealtimeConnectionManager) {
        let api = Arc::new(FakeChannelApi::new());
        let manager = RealtimeConnectionManager::new(api.clone(), settings());
        (api, manager)
    }

    fn bookmark_insert(user: &str) -> TableChange {
        TableChange::new(
            "bookmarks",
            ChangeKind::Insert,
            ChangePayload {
                new: Some(json!({"id": 1, "user_id": user})),
                old: None,
            },
        )
    }

    fn forwarder(tx: &mpsc::UnboundedSender<&'static str>, name: &'static str) -> ChangeCallback {
        let tx = tx.clone();
        Arc::new(move |_| {
            let _ = tx.send(name);
        })
    }

    async fn next_notice(rx: &mut broadcast::Receiver<ConnectionNotice>) -> ConnectionNotice {
        tokio::time::timeout(Duration::from_secs(60), rx.recv())
            .await
            .expect("notice timed out")
            .expect("notice channel closed")
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let (api, manager) = setup();
        let topic = Topic::connection_status();

        let first = manager.open(topic.clone()).await.unwrap();
        let second = manager.open(topic.clone()).await.unwrap();

        assert!(first.same_channel(&second));
        assert_eq!(first.channel_id(), second.channel_id());
        assert_eq!(api.open_count(&topic), 1);
        assert_eq!(manager.topic_count().await, 1);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn distinct_topics_get_distinct_channels() {
        let (_api, manager) = setup();
        let a = manager.open(Topic::new("a")).await.unwrap();
        let b = manager.open(Topic::new("b")).await.unwrap();
        assert!(!a.same_channel(&b));
        assert_eq!(manager.topic_count().await, 2);
    }

    #[tokio::test]
    async fn subscriber_receives_changes_in_order() {
        let (api, manager) = setup();
        let topic = Topic::new("t");
        let _handle = manager.open(topic.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _a = manager.subscribe("bookmarks", RowFilter::All, forwarder(&tx, "a"));
        let _b = manager.subscribe("bookmarks", RowFilter::All, forwarder(&tx, "b"));

        assert!(api.push_change(&topic, bookmark_insert("u1")).await);
        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, Some("b"));
    }

    #[tokio::test]
    async fn unsubscribed_callback_not_invoked() {
        let (api, manager) = setup();
        let topic = Topic::new("t");
        let _handle = manager.open(topic.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let gone = manager.subscribe("bookmarks", RowFilter::All, forwarder(&tx, "gone"));
        let _kept = manager.subscribe("bookmarks", RowFilter::All, forwarder(&tx, "kept"));
        manager.unsubscribe(&gone);
        manager.unsubscribe(&gone);

        assert!(api.push_change(&topic, bookmark_insert("u1")).await);
        assert_eq!(rx.recv().await, Some("kept"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_open_schedules_reconnect() {
        let (api, manager) = setup();
        let mut notices = manager.notices();
        let topic = Topic::new("t");
        api.fail_next(1);

        let err = manager.open(topic.clone()).await.unwrap_err();
        assert_matches!(err, ConnectionError::Unreachable(_));
        assert_eq!(
            manager.topic_state(&topic).await,
            Some(ConnectionState::Disconnected)
        );
        assert_matches!(next_notice(&mut notices).await, ConnectionNotice::Lost { .. });
        assert_matches!(
            next_notice(&mut notices).await,
            ConnectionNotice::Reconnecting { attempt: 1, .. }
        );
        assert_matches!(
            next_notice(&mut notices).await,
            ConnectionNotice::Restored {
                resync_required: true,
                ..
            }
        );
        assert_eq!(api.open_count(&topic), 2);
        assert_eq!(
            manager.topic_state(&topic).await,
            Some(ConnectionState::Connected)
        );

        // A later open reuses the recovered channel.
        let handle = manager.open(topic.clone()).await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Connected);
        assert_eq!(api.open_count(&topic), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_drops_changes_until_native_reconnect() {
        let (api, manager) = setup();
        let mut notices = manager.notices();
        let topic = Topic::new("t");
        let handle = manager.open(topic.clone()).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = manager.subscribe("bookmarks", RowFilter::All, forwarder(&tx, "sub"));

        assert!(
            api.push(
                &topic,
                ChannelEvent::Disconnected {
                    reason: "network".into()
                }
            )
            .await
        );
        assert_matches!(next_notice(&mut notices).await, ConnectionNotice::Lost { .. });
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        // Not delivered while down.
        assert!(api.push_change(&topic, bookmark_insert("u1")).await);
        // The library recovers by itself before our first attempt fires.
        assert!(api.push(&topic, ChannelEvent::Reconnected).await);
        assert_matches!(
            next_notice(&mut notices).await,
            ConnectionNotice::Restored {
                resync_required: true,
                ..
            }
        );
        assert!(rx.try_recv().is_err());

        // Pending attempt was cancelled: no extra open even after the delays pass.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(api.open_count(&topic), 1);

        assert!(api.push_change(&topic, bookmark_insert("u1")).await);
        assert_eq!(rx.recv().await, Some("sub"));
    }

    #[tokio::test(start_paused = true)]
    async fn closed_stream_reconnects_with_new_channel() {
        let (api, manager) = setup();
        let mut notices = manager.notices();
        let topic = Topic::new("t");
        let handle = manager.open(topic.clone()).await.unwrap();
        let original = handle.channel_id().unwrap();

        api.drop_stream(&topic);
        assert_matches!(next_notice(&mut notices).await, ConnectionNotice::Lost { .. });
        assert_matches!(
            next_notice(&mut notices).await,
            ConnectionNotice::Reconnecting { attempt: 1, .. }
        );
        assert_matches!(
            next_notice(&mut notices).await,
            ConnectionNotice::Restored {
                resync_required: true,
                ..
            }
        );

        assert_eq!(api.open_count(&topic), 2);
        let current = handle.channel_id().unwrap();
        assert_ne!(current, original);
        assert!(api.removed().contains(&original));
        assert_eq!(handle.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_reconnect() {
        let (api, manager) = setup();
        let topic = Topic::new("t");
        api.fail_next(1);
        let _ = manager.open(topic.clone()).await;

        manager.close(&topic).await;
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(api.open_count(&topic), 1);
        assert_eq!(manager.topic_count().await, 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn close_removes_channel_and_is_idempotent() {
        let (api, manager) = setup();
        let topic = Topic::new("t");
        let handle = manager.open(topic.clone()).await.unwrap();
        let channel = handle.channel_id().unwrap();

        manager.close(&topic).await;
        manager.close(&topic).await;

        assert_eq!(api.removed(), vec![channel]);
        assert_eq!(handle.state(), ConnectionState::Disconnected);
        assert!(handle.channel_id().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let (api, manager) = setup();
        let mut notices = manager.notices();
        let topic = Topic::new("t");
        api.set_always_fail(true);
        let _ = manager.open(topic.clone()).await;

        loop {
            match next_notice(&mut notices).await {
                ConnectionNotice::GaveUp { attempts, .. } => {
                    assert_eq!(attempts, 3);
                    break;
                }
                ConnectionNotice::Restored { .. } => panic!("should not reconnect"),
                _ => {}
            }
        }
        assert_eq!(api.open_count(&topic), 4);
        assert_eq!(
            manager.topic_state(&topic).await,
            Some(ConnectionState::Disconnected)
        );

        // Manual retry once the backend is back.
        api.set_always_fail(false);
        assert!(manager.reconnect(&topic).await);
        loop {
            if let ConnectionNotice::Restored { .. } = next_notice(&mut notices).await {
                break;
            }
        }
        assert_eq!(
            manager.topic_state(&topic).await,
            Some(ConnectionState::Connected)
        );
    }

    #[tokio::test]
    async fn watch_state_tracks_aggregate() {
        let (_api, manager) = setup();
        let mut rx = manager.watch_state();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);

        let _ = manager.open(Topic::new("t")).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), ConnectionState::Connected);

        manager.shutdown().await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Disconnected);
    }
}
