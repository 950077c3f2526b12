//! Conversation progress tracker.

use std::collections::HashSet;

use pathway_core::{ChatMessage, MessageId, MessageMetadata, MessageRole};
use pathway_settings::ProgressSettings;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::state::{COMPLETE_CATEGORY, ProgressState};

/// Derives [`ProgressState`] from chat messages in arrival order.
///
/// [`Self::ingest`] is the only mutator. A message id already seen is
/// ignored, and a message from another chat session starts over.
pub struct ConversationProgressTracker {
    estimated_total: u32,
    state: ProgressState,
    seen: HashSet<MessageId>,
    tx: watch::Sender<ProgressState>,
}

impl ConversationProgressTracker {
    /// Tracker assuming `estimated_total` questions per conversation.
    pub fn new(estimated_total: u32) -> Self {
        let (tx, _) = watch::channel(ProgressState::default());
        Self {
            estimated_total: estimated_total.max(1),
            state: ProgressState::default(),
            seen: HashSet::new(),
            tx,
        }
    }

    /// Tracker configured from settings.
    pub fn from_settings(settings: &ProgressSettings) -> Self {
        Self::new(settings.estimated_total)
    }

    /// Apply one message. Returns whether the observable state changed.
    pub fn ingest(&mut self, message: &ChatMessage) -> bool {
        if self.state.session_id.as_ref() != Some(&message.session_id) {
            if self.state.session_id.is_some() {
                debug!(from = ?self.state.session_id, to = %message.session_id, "chat session switched, progress reset");
            }
            self.state = ProgressState::for_session(message.session_id.clone());
            self.seen.clear();
        } else if self.seen.contains(&message.id) {
            return false;
        }
        let _ = self.seen.insert(message.id.clone());

        let mut next = self.state.clone();
        apply(&mut next, message, self.estimated_total);

        let changed = next != self.state || self.tx.borrow().session_id != next.session_id;
        if changed {
            self.state = next;
            let _ = self.tx.send_replace(self.state.clone());
        }
        changed
    }

    /// Current snapshot.
    pub fn state(&self) -> ProgressState {
        self.state.clone()
    }

    /// Observe snapshots as they change.
    pub fn watch(&self) -> watch::Receiver<ProgressState> {
        self.tx.subscribe()
    }

    /// Forget everything, including the current session.
    pub fn reset(&mut self) {
        self.state = ProgressState::default();
        self.seen.clear();
        let _ = self.tx.send_replace(ProgressState::default());
    }

    /// Assumed questions per conversation.
    pub fn estimated_total(&self) -> u32 {
        self.estimated_total
    }
}

fn apply(state: &mut ProgressState, message: &ChatMessage, estimated_total: u32) {
    if message.metadata.is_recommendation() {
        if !state.is_complete {
            info!(session_id = %message.session_id, answered = state.answered(), "conversation complete");
        }
        state.is_complete = true;
        state.overall_percent = 100;
        state.current_category = Some(COMPLETE_CATEGORY.to_string());
        return;
    }

    if message.role != MessageRole::Bot {
        return;
    }
    let MessageMetadata::Category { value } = &message.metadata else {
        debug!(message_id = %message.id, "bot message without category ignored");
        return;
    };

    *state.per_category_counts.entry(value.clone()).or_insert(0) += 1;
    if !state.is_complete {
        state.current_category = Some(value.clone());
        state.overall_percent = state
            .overall_percent
            .max(percent(state.answered(), estimated_total));
    }
}

/// `min(round(answered / total * 100), 100)`.
#[allow(clippy::cast_possible_truncation)]
fn percent(answered: u32, estimated_total: u32) -> u8 {
    let total = u64::from(estimated_total.max(1));
    let rounded = (u64::from(answered) * 200 + total) / (2 * total);
    rounded.min(100) as u8
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
