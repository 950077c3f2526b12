//! Per-user bookmark cache kept current by live table changes.
//!
//! Changes missed while the channel was down are never replayed, so the cache
//! refetches every row whenever its topic is restored with
//! `resync_required`, or when it fell behind on notices.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use pathway_core::{ChangeKind, RowFilter, TableChange, UserId};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::channel::Topic;
use crate::errors::ConnectionError;
use crate::manager::RealtimeConnectionManager;
use crate::state::ConnectionNotice;
use crate::subscription::SubscriptionGuard;

/// Table holding saved career paths.
pub const BOOKMARKS_TABLE: &str = "bookmarks";

/// Full-row fetch used on start and after a resync.
#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Every bookmark row of `user_id`.
    async fn fetch_bookmarks(&self, user_id: &UserId) -> Result<Vec<Value>, ConnectionError>;
}

type Rows = Arc<RwLock<BTreeMap<String, Value>>>;

/// Bookmarks of one user, keyed by row `id`.
pub struct BookmarkCache {
    user_id: UserId,
    topic: Topic,
    rows: Rows,
    source: Arc<dyn BookmarkSource>,
    _subscription: SubscriptionGuard,
    cancel: CancellationToken,
}

impl BookmarkCache {
    /// Subscribe, open the user's bookmark topic, and load the initial rows.
    ///
    /// A failed open or fetch is logged and left to the reconnect path.
    pub async fn start(
        manager: &RealtimeConnectionManager,
        source: Arc<dyn BookmarkSource>,
        user_id: UserId,
    ) -> Self {
        let topic = Topic::bookmarks(&user_id);
        let rows: Rows = Arc::default();

        let sink = Arc::clone(&rows);
        let subscription = manager.subscribe_scoped(
            BOOKMARKS_TABLE,
            RowFilter::eq("user_id", user_id.as_str()),
            Arc::new(move |change| apply_change(&sink, change)),
        );

        let cancel = CancellationToken::new();
        spawn_resync(
            manager,
            topic.clone(),
            Arc::clone(&source),
            user_id.clone(),
            Arc::clone(&rows),
            cancel.clone(),
        );

        if let Err(err) = manager.open(topic.clone()).await {
            warn!(topic = %topic, error = %err, "bookmark channel unavailable, waiting for reconnect");
        }

        let cache = Self {
            user_id,
            topic,
            rows,
            source,
            _subscription: subscription,
            cancel,
        };
        if let Err(err) = cache.refetch().await {
            warn!(user_id = %cache.user_id, error = %err, "initial bookmark fetch failed");
        }
        cache
    }

    /// Replace the cache with a fresh fetch. Returns the row count.
    pub async fn refetch(&self) -> Result<usize, ConnectionError> {
        refetch(self.source.as_ref(), &self.user_id, &self.rows).await
    }

    /// Topic the cache listens on.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Snapshot of all rows, ordered by id.
    pub fn rows(&self) -> Vec<Value> {
        self.rows.read().values().cloned().collect()
    }

    /// Row with the given id.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.rows.read().get(id).cloned()
    }

    /// Number of cached rows.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Whether the cache holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl Drop for BookmarkCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn row_key(row: &Value) -> Option<String> {
    match row.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn apply_change(rows: &Rows, change: &TableChange) {
    match change.kind {
        ChangeKind::Insert | ChangeKind::Update => {
            let Some(row) = change.payload.new.as_ref() else {
                return;
            };
            if let Some(key) = row_key(row) {
                let _ = rows.write().insert(key, row.clone());
            }
        }
        ChangeKind::Delete => {
            if let Some(key) = change.payload.old.as_ref().and_then(row_key) {
                let _ = rows.write().remove(&key);
            }
        }
    }
}

async fn refetch(
    source: &dyn BookmarkSource,
    user_id: &UserId,
    rows: &Rows,
) -> Result<usize, ConnectionError> {
    let fetched = source.fetch_bookmarks(user_id).await?;
    let fresh: BTreeMap<String, Value> = fetched
        .into_iter()
        .filter_map(|row| row_key(&row).map(|key| (key, row)))
        .collect();
    let count = fresh.len();
    *rows.write() = fresh;
    debug!(user_id = %user_id, count, "bookmarks refetched");
    Ok(count)
}

fn spawn_resync(
    manager: &RealtimeConnectionManager,
    topic: Topic,
    source: Arc<dyn BookmarkSource>,
    user_id: UserId,
    rows: Rows,
    cancel: CancellationToken,
) {
    let mut notices = manager.notices();
    drop(tokio::spawn(async move {
        loop {
            let notice = tokio::select! {
                () = cancel.cancelled() => break,
                notice = notices.recv() => notice,
            };
            let resync = match notice {
                Ok(ConnectionNotice::Restored {
                    topic: restored,
                    resync_required,
                }) => restored == topic && resync_required,
                Ok(_) => false,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "connection notices lagged, resyncing bookmarks");
                    true
                }
                Err(RecvError::Closed) => break,
            };
            if !resync {
                continue;
            }
            match refetch(source.as_ref(), &user_id, &rows).await {
                Ok(count) => info!(topic = %topic, count, "bookmarks resynced after reconnect"),
                Err(err) => warn!(topic = %topic, error = %err, "bookmark resync failed"),
            }
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeChannelApi;
    use crate::state::ConnectionState;
    use parking_lot::Mutex;
    use pathway_core::ChangePayload;
    use pathway_settings::RealtimeSettings;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeSource {
        rows: Mutex<Vec<Value>>,
        fetches: Mutex<u32>,
    }

    impl FakeSource {
        fn set_rows(&self, rows: Vec<Value>) {
            *self.rows.lock() = rows;
        }

        fn fetches(&self) -> u32 {
            *self.fetches.lock()
        }
    }

    #[async_trait]
    impl BookmarkSource for FakeSource {
        async fn fetch_bookmarks(&self, _user_id: &UserId) -> Result<Vec<Value>, ConnectionError> {
            *self.fetches.lock() += 1;
            Ok(self.rows.lock().clone())
        }
    }

    fn settings() -> RealtimeSettings {
        RealtimeSettings {
            reconnect_base_delay_ms: 100,
            jitter_factor: 0.0,
            ..RealtimeSettings::default()
        }
    }

    fn change(kind: ChangeKind, new: Option<Value>, old: Option<Value>) -> TableChange {
        TableChange::new(BOOKMARKS_TABLE, kind, ChangePayload { new, old })
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn loads_rows_and_applies_live_changes() {
        let api = Arc::new(FakeChannelApi::new());
        let manager = RealtimeConnectionManager::new(api.clone(), settings());
        let source = Arc::new(FakeSource::default());
        source.set_rows(vec![json!({"id": 1, "user_id": "u1", "title": "Nurse"})]);
        let user = UserId::from_raw("u1");

        let cache = BookmarkCache::start(&manager, source.clone(), user.clone()).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(source.fetches(), 1);

        let topic = cache.topic().clone();
        assert!(
            api.push_change(
                &topic,
                change(
                    ChangeKind::Insert,
                    Some(json!({"id": 2, "user_id": "u1", "title": "Welder"})),
                    None
                )
            )
            .await
        );
        assert!(
            api.push_change(
                &topic,
                change(
                    ChangeKind::Insert,
                    Some(json!({"id": 3, "user_id": "someone-else"})),
                    None
                )
            )
            .await
        );
        assert!(
            api.push_change(
                &topic,
                change(ChangeKind::Delete, None, Some(json!({"id": 1, "user_id": "u1"})))
            )
            .await
        );
        settle().await;

        assert_eq!(cache.len(), 1);
        assert!(cache.get("1").is_none());
        assert_eq!(cache.get("2").unwrap()["title"], "Welder");
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_after_reconnect() {
        let api = Arc::new(FakeChannelApi::new());
        let manager = RealtimeConnectionManager::new(api.clone(), settings());
        let source = Arc::new(FakeSource::default());
        source.set_rows(vec![json!({"id": "a", "user_id": "u1"})]);

        let cache = BookmarkCache::start(&manager, source.clone(), UserId::from_raw("u1")).await;
        assert_eq!(cache.len(), 1);

        // Rows added on the server while the channel is down.
        api.drop_stream(cache.topic());
        source.set_rows(vec![
            json!({"id": "a", "user_id": "u1"}),
            json!({"id": "b", "user_id": "u1"}),
        ]);

        for _ in 0..100 {
            if source.fetches() >= 2 {
                break;
            }
            settle().await;
        }
        settle().await;
        assert_eq!(source.fetches(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_survives_rejected_open() {
        let api = Arc::new(FakeChannelApi::new());
        api.fail_next(1);
        let manager = RealtimeConnectionManager::new(api.clone(), settings());
        let source = Arc::new(FakeSource::default());
        source.set_rows(vec![json!({"id": 7, "user_id": "u1"})]);

        let cache = BookmarkCache::start(&manager, source.clone(), UserId::from_raw("u1")).await;
        assert_eq!(cache.len(), 1);
        assert!(manager.topic_state(cache.topic()).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn refetches_once_rejected_open_recovers() {
        let api = Arc::new(FakeChannelApi::new());
        api.fail_next(1);
        let manager = RealtimeConnectionManager::new(api.clone(), settings());
        let source = Arc::new(FakeSource::default());
        source.set_rows(vec![json!({"id": 1, "user_id": "u1"})]);

        let cache = BookmarkCache::start(&manager, source.clone(), UserId::from_raw("u1")).await;
        assert_eq!(cache.len(), 1);

        // Written on the server before the channel ever came up.
        source.set_rows(vec![
            json!({"id": 1, "user_id": "u1"}),
            json!({"id": 2, "user_id": "u1"}),
        ]);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            manager.topic_state(cache.topic()).await,
            Some(ConnectionState::Connected)
        );
        assert_eq!(source.fetches(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn key_only_delete_removes_row() {
        let api = Arc::new(FakeChannelApi::new());
        let manager = RealtimeConnectionManager::new(api.clone(), settings());
        let source = Arc::new(FakeSource::default());
        source.set_rows(vec![json!({"id": 1, "user_id": "u1"})]);

        let cache = BookmarkCache::start(&manager, source.clone(), UserId::from_raw("u1")).await;
        assert_eq!(cache.len(), 1);

        assert!(
            api.push_change(
                cache.topic(),
                change(ChangeKind::Delete, None, Some(json!({"id": 1})))
            )
            .await
        );
        settle().await;

        assert!(cache.is_empty());
    }

    #[test]
    fn rows_without_id_are_ignored() {
        let rows: Rows = Arc::default();
        apply_change(&rows, &change(ChangeKind::Insert, Some(json!({"title": "x"})), None));
        assert!(rows.read().is_empty());
    }
}
