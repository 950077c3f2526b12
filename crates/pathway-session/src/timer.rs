//! Heartbeat timer task.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lifecycle of the coordinator's heartbeat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerState {
    /// Never armed.
    #[default]
    Idle,
    /// Armed and ticking.
    Running,
    /// Cancelled (logout, expiry, or disposal).
    Stopped,
}

/// Work run on each tick. `Break` stops the timer.
#[async_trait]
pub(crate) trait Heartbeat: Send + Sync + 'static {
    async fn beat(self: Arc<Self>) -> ControlFlow<()>;
}

/// Why a heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeartbeatExit {
    Cancelled,
    Stopped,
    TargetDropped,
}

/// Decrements the live-timer count when the task ends, however it ends.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Shortest period the loop will tick at; `interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// A running heartbeat. Dropping it cancels the task.
///
/// The task is never aborted: a tick already in progress finishes, then the
/// loop observes cancellation and exits.
pub(crate) struct HeartbeatTimer {
    id: u64,
    token: CancellationToken,
}

impl HeartbeatTimer {
    /// Spawn a heartbeat whose first tick fires one `period` from now.
    pub(crate) fn start<H: Heartbeat>(target: Weak<H>, period: Duration, live: &Arc<AtomicUsize>) -> Self {
        let id = NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let _ = live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(live));

        let cancel = token.clone();
        drop(tokio::spawn(async move {
            let _guard = guard;
            debug!(timer_id = id, ?period, "heartbeat armed");
            let exit = run_heartbeat(target, period, cancel).await;
            debug!(timer_id = id, ?exit, "heartbeat ended");
        }));

        Self { id, token }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

async fn run_heartbeat<H: Heartbeat>(
    target: Weak<H>,
    period: Duration,
    cancel: CancellationToken,
) -> HeartbeatExit {
    let period = period.max(MIN_PERIOD);
    let mut ticks = time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return HeartbeatExit::Cancelled,
            _ = ticks.tick() => {
                let Some(strong) = target.upgrade() else {
                    return HeartbeatExit::TargetDropped;
                };
                if strong.beat().await.is_break() {
                    return HeartbeatExit::Stopped;
                }
            }
        }
    }
}
