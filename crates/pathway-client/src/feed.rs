//! Chat message ingestion into per-session progress trackers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pathway_core::{ChatMessage, MessageId, SessionId};
use pathway_progress::{ConversationProgressTracker, ProgressState};
use pathway_realtime::ConnectionError;
use pathway_settings::{ChatSettings, ProgressSettings};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Pull-based access to a chat session's message log.
#[async_trait]
pub trait ChatSource: Send + Sync {
    /// Up to `limit` messages of `session_id` created after `after`
    /// (from the start when `None`), oldest first.
    async fn fetch_messages(
        &self,
        session_id: &SessionId,
        after: Option<&MessageId>,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, ConnectionError>;
}

type Trackers = Arc<Mutex<HashMap<SessionId, ConversationProgressTracker>>>;

/// Routes chat messages to one progress tracker per chat session.
///
/// Feeds spawned from it stop when [`Self::stop`] is called or the feed is
/// dropped.
pub struct ChatFeed {
    chat: ChatSettings,
    progress: ProgressSettings,
    trackers: Trackers,
    cancel: CancellationToken,
}

impl ChatFeed {
    /// Empty feed.
    pub fn new(chat: ChatSettings, progress: ProgressSettings) -> Self {
        Self {
            chat,
            progress,
            trackers: Arc::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Apply one message to its session's tracker.
    pub fn ingest(&self, message: &ChatMessage) -> bool {
        ingest(&self.trackers, &self.progress, message)
    }

    /// Progress of a session, if any message of it was seen.
    pub fn progress(&self, session_id: &SessionId) -> Option<ProgressState> {
        self.trackers.lock().get(session_id).map(ConversationProgressTracker::state)
    }

    /// Observe a session's progress, creating its tracker if needed.
    pub fn watch(&self, session_id: &SessionId) -> watch::Receiver<ProgressState> {
        self.trackers
            .lock()
            .entry(session_id.clone())
            .or_insert_with(|| ConversationProgressTracker::from_settings(&self.progress))
            .watch()
    }

    /// Drop a session's tracker. Returns whether one existed.
    pub fn forget(&self, session_id: &SessionId) -> bool {
        self.trackers.lock().remove(session_id).is_some()
    }

    /// Sessions currently tracked.
    pub fn sessions(&self) -> Vec<SessionId> {
        self.trackers.lock().keys().cloned().collect()
    }

    /// Ingest pushed messages until the sender closes or the feed stops.
    ///
    /// The task returns the number of messages that changed progress.
    pub fn spawn_stream(&self, mut messages: mpsc::Receiver<ChatMessage>) -> JoinHandle<usize> {
        let trackers = Arc::clone(&self.trackers);
        let progress = self.progress.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            let mut applied = 0;
            loop {
                let message = tokio::select! {
                    () = cancel.cancelled() => break,
                    message = messages.recv() => message,
                };
                let Some(message) = message else { break };
                if ingest(&trackers, &progress, &message) {
                    applied += 1;
                }
            }
            debug!(applied, "chat stream ended");
            applied
        })
    }

    /// Poll `source` for new messages of `session_id` every
    /// `poll_interval_ms`, starting immediately.
    pub fn spawn_polling(&self, source: Arc<dyn ChatSource>, session_id: SessionId) -> JoinHandle<()> {
        let trackers = Arc::clone(&self.trackers);
        let progress = self.progress.clone();
        let chat = self.chat.clone();
        let cancel = self.cancel.child_token();

        tokio::spawn(async move {
            // `interval` rejects a zero period.
            let mut ticks = time::interval(chat.poll_interval().max(Duration::from_millis(1)));
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut cursor: Option<MessageId> = None;

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticks.tick() => {}
                }
                let batch = match source
                    .fetch_messages(&session_id, cursor.as_ref(), chat.poll_batch_size)
                    .await
                {
                    Ok(batch) => batch,
                    Err(err) => {
                        warn!(session_id = %session_id, error = %err, kind = err.error_kind(), "chat poll failed");
                        continue;
                    }
                };
                trace!(session_id = %session_id, count = batch.len(), "chat poll");
                for message in &batch {
                    let _ = ingest(&trackers, &progress, message);
                }
                if let Some(last) = batch.last() {
                    cursor = Some(last.id.clone());
                }
            }
            debug!(session_id = %session_id, "chat polling stopped");
        })
    }

    /// Stop every feed spawned from this instance.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether [`Self::stop`] was called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ChatFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn ingest(trackers: &Trackers, progress: &ProgressSettings, message: &ChatMessage) -> bool {
    trackers
        .lock()
        .entry(message.session_id.clone())
        .or_insert_with(|| ConversationProgressTracker::from_settings(progress))
        .ingest(message)
}
