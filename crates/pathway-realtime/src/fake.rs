//! In-memory [`ChannelApi`] for tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use pathway_core::{ChannelId, TableChange};
use tokio::sync::mpsc;

use crate::channel::{ChannelApi, ChannelEvent, OpenedChannel, Topic};
use crate::errors::ConnectionError;

#[derive(Default)]
struct FakeState {
    opens: HashMap<Topic, u32>,
    senders: HashMap<Topic, (ChannelId, mpsc::Sender<ChannelEvent>)>,
    removed: Vec<ChannelId>,
    failures: VecDeque<ConnectionError>,
    always_fail: bool,
}

/// Records channel calls and lets tests push events into open channels.
#[derive(Default)]
pub struct FakeChannelApi {
    state: Mutex<FakeState>,
}

impl FakeChannelApi {
    /// Fresh fake; every open succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` opens fail with `Unreachable`.
    pub fn fail_next(&self, n: usize) {
        let mut state = self.state.lock();
        for _ in 0..n {
            state
                .failures
                .push_back(ConnectionError::Unreachable("fake outage".into()));
        }
    }

    /// Make every open fail until cleared.
    pub fn set_always_fail(&self, fail: bool) {
        self.state.lock().always_fail = fail;
    }

    /// Open calls made for `topic`, successful or not.
    pub fn open_count(&self, topic: &Topic) -> u32 {
        self.state.lock().opens.get(topic).copied().unwrap_or(0)
    }

    /// Channels passed to `remove_channel`, in order.
    pub fn removed(&self) -> Vec<ChannelId> {
        self.state.lock().removed.clone()
    }

    /// Latest channel opened for `topic`.
    pub fn channel_id(&self, topic: &Topic) -> Option<ChannelId> {
        self.state.lock().senders.get(topic).map(|(id, _)| id.clone())
    }

    /// Push an event into the latest channel of `topic`.
    pub async fn push(&self, topic: &Topic, event: ChannelEvent) -> bool {
        let sender = self.state.lock().senders.get(topic).map(|(_, tx)| tx.clone());
        match sender {
            Some(tx) => tx.send(event).await.is_ok(),
            None => false,
        }
    }

    /// Push a table change into the latest channel of `topic`.
    pub async fn push_change(&self, topic: &Topic, change: TableChange) -> bool {
        self.push(topic, ChannelEvent::Change(change)).await
    }

    /// Close the event stream of the latest channel of `topic`.
    pub fn drop_stream(&self, topic: &Topic) {
        let _ = self.state.lock().senders.remove(topic);
    }
}

#[async_trait]
impl ChannelApi for FakeChannelApi {
    async fn open_channel(&self, topic: &Topic) -> Result<OpenedChannel, ConnectionError> {
        let mut state = self.state.lock();
        *state.opens.entry(topic.clone()).or_insert(0) += 1;
        if state.always_fail {
            return Err(ConnectionError::Unreachable("fake outage".into()));
        }
        if let Some(err) = state.failures.pop_front() {
            return Err(err);
        }
        let id = ChannelId::new();
        let (tx, rx) = mpsc::channel(64);
        let _ = state.senders.insert(topic.clone(), (id.clone(), tx));
        Ok(OpenedChannel { id, events: rx })
    }

    async fn remove_channel(&self, channel: &ChannelId) {
        let mut state = self.state.lock();
        state.removed.push(channel.clone());
        state.senders.retain(|_, (id, _)| id != channel);
    }
}
