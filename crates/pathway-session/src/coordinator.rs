//! Session lifecycle coordinator.
//!
//! Holds the current [`SessionRecord`] (replaced wholesale, never mutated)
//! and at most one live [`HeartbeatTimer`]. Every record change goes through
//! one critical section that cancels the previous timer before arming the
//! next, so repeated `set_session` calls never leave duplicate timers.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pathway_core::{Clock, SessionRecord, SystemClock};
use pathway_settings::SessionSettings;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::auth::{AuthApi, AuthEvent};
use crate::errors::RefreshError;
use crate::status::{SessionPhase, SessionSignal, SessionStatus};
use crate::timer::{Heartbeat, HeartbeatTimer, TimerState};

/// What a heartbeat tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// No active session to check.
    Idle,
    /// Plenty of time left.
    Healthy {
        /// Time until expiry.
        remaining: Duration,
    },
    /// The session was refreshed.
    Refreshed,
    /// The refresh failed; the old session is kept.
    RefreshFailed(RefreshError),
    /// The session changed while refreshing; the result was dropped.
    Superseded,
    /// Expiry was observed and the user logged out.
    Expired,
}

/// Why the coordinator is forcing a logout.
#[derive(Clone, Copy, Debug)]
enum LogoutCause {
    Expired,
    Invalidated,
}

#[derive(Default)]
struct SessionState {
    record: Option<Arc<SessionRecord>>,
    phase: SessionPhase,
    /// Bumped on every record change; in-flight work from an older
    /// generation is discarded.
    generation: u64,
    timer: Option<HeartbeatTimer>,
    timer_state: TimerState,
    disposed: bool,
}

impl SessionState {
    fn status(&self) -> SessionStatus {
        SessionStatus {
            phase: self.phase,
            user_id: self.record.as_ref().map(|r| r.user_id().clone()),
            expires_at: self.record.as_ref().map(|r| r.expires_at()),
        }
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            debug!(timer_id = timer.id(), "heartbeat cancelled");
            self.timer_state = TimerState::Stopped;
        }
    }
}

struct Inner {
    auth: Arc<dyn AuthApi>,
    clock: Arc<dyn Clock>,
    settings: SessionSettings,
    state: Mutex<SessionState>,
    live_timers: Arc<AtomicUsize>,
    status_tx: watch::Sender<SessionStatus>,
    signals: broadcast::Sender<SessionSignal>,
}

/// Owns the authentication session and keeps it fresh.
///
/// Cheap to clone. Must be used inside a tokio runtime; arming a session
/// spawns the heartbeat task.
#[derive(Clone)]
pub struct SessionLifecycleCoordinator {
    inner: Arc<Inner>,
}

impl SessionLifecycleCoordinator {
    /// Coordinator using the system clock.
    pub fn new(auth: Arc<dyn AuthApi>, settings: SessionSettings) -> Self {
        Self::with_clock(auth, settings, Arc::new(SystemClock))
    }

    /// Coordinator reading wall-clock time from `clock`.
    pub fn with_clock(auth: Arc<dyn AuthApi>, settings: SessionSettings, clock: Arc<dyn Clock>) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::default());
        let (signals, _) = broadcast::channel(settings.signal_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                auth,
                clock,
                settings,
                state: Mutex::new(SessionState::default()),
                live_timers: Arc::new(AtomicUsize::new(0)),
                status_tx,
                signals,
            }),
        }
    }

    /// Replace the session. `Some` arms a fresh heartbeat, `None` logs out.
    ///
    /// Returns `false` after [`Self::dispose`].
    pub fn set_session(&self, record: Option<SessionRecord>) -> bool {
        self.inner.install(record, None)
    }

    /// Seed the coordinator from the Data Service's persisted session.
    ///
    /// Returns whether a session was found.
    pub async fn restore(&self) -> Result<bool, RefreshError> {
        let record = self.inner.auth.get_session().await?;
        let found = record.is_some();
        info!(found, "session restored from auth service");
        let _ = self.set_session(record);
        Ok(found)
    }

    /// Apply an auth notification from the Data Service.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(record) | AuthEvent::TokenRefreshed(record) => {
                let _ = self.set_session(Some(record));
            }
            AuthEvent::SignedOut => {
                let _ = self.set_session(None);
            }
            AuthEvent::SessionInvalid => {
                let generation = self.inner.state.lock().generation;
                let _ = self.inner.force_logout(generation, LogoutCause::Invalidated).await;
            }
        }
    }

    /// Run one heartbeat check now, outside the timer schedule.
    pub async fn check_now(&self) -> TickOutcome {
        Arc::clone(&self.inner).tick().await
    }

    /// Time until the session expires; zero when logged out or expired.
    pub fn time_remaining(&self) -> Duration {
        let state = self.inner.state.lock();
        match (&state.record, state.phase) {
            (Some(record), SessionPhase::Active | SessionPhase::Refreshing) => {
                record.remaining(self.inner.clock.now())
            }
            _ => Duration::ZERO,
        }
    }

    /// Current session record.
    pub fn session(&self) -> Option<Arc<SessionRecord>> {
        self.inner.state.lock().record.clone()
    }

    /// Current status snapshot.
    pub fn status(&self) -> SessionStatus {
        self.inner.status_tx.borrow().clone()
    }

    /// Observe status changes.
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Observe one-off session signals.
    pub fn signals(&self) -> broadcast::Receiver<SessionSignal> {
        self.inner.signals.subscribe()
    }

    /// Heartbeat lifecycle.
    pub fn timer_state(&self) -> TimerState {
        self.inner.state.lock().timer_state
    }

    /// Heartbeat tasks still running, including ones finishing a tick after
    /// cancellation.
    pub fn live_timers(&self) -> usize {
        self.inner.live_timers.load(Ordering::SeqCst)
    }

    /// Stop the heartbeat for good. Later `set_session` calls are ignored.
    ///
    /// A refresh still in flight finishes, but its result is discarded and
    /// the phase no longer reads `Refreshing`.
    pub fn dispose(&self) {
        let status = {
            let mut state = self.inner.state.lock();
            state.disposed = true;
            state.generation += 1;
            state.stop_timer();
            if state.phase == SessionPhase::Refreshing {
                state.phase = SessionPhase::Active;
            }
            state.status()
        };
        let _ = self.inner.status_tx.send_replace(status);
        debug!("session coordinator disposed");
    }
}

impl Inner {
    /// Swap the record and re-arm the timer in one critical section.
    ///
    /// With `expected` set, the swap only happens if no other change landed
    /// since that generation.
    fn install(self: &Arc<Self>, record: Option<SessionRecord>, expected: Option<u64>) -> bool {
        let (status, signed_out) = {
            let mut state = self.state.lock();
            if state.disposed {
                debug!("session change ignored after dispose");
                return false;
            }
            if expected.is_some_and(|g| g != state.generation) {
                return false;
            }

            state.generation += 1;
            state.stop_timer();
            let had_session = state.record.is_some();

            match record {
                Some(record) => {
                    debug!(user_id = %record.user_id(), expires_at = %record.expires_at(), "session armed");
                    state.record = Some(Arc::new(record));
                    state.phase = SessionPhase::Active;
                    let timer = HeartbeatTimer::start(
                        Arc::downgrade(self),
                        self.settings.heartbeat_interval(),
                        &self.live_timers,
                    );
                    state.timer = Some(timer);
                    state.timer_state = TimerState::Running;
                }
                None => {
                    state.record = None;
                    state.phase = SessionPhase::NoSession;
                }
            }
            (state.status(), had_session && state.record.is_none())
        };

        let _ = self.status_tx.send_replace(status);
        if signed_out {
            info!("session cleared");
            let _ = self.signals.send(SessionSignal::SignedOut);
        }
        true
    }

    fn publish_status(&self) {
        let status = self.state.lock().status();
        let _ = self.status_tx.send_replace(status);
    }

    async fn tick(self: Arc<Self>) -> TickOutcome {
        let (record, generation) = {
            let state = self.state.lock();
            match (&state.record, state.phase) {
                (Some(record), SessionPhase::Active) => (Arc::clone(record), state.generation),
                _ => return TickOutcome::Idle,
            }
        };

        let now = self.clock.now();
        if record.is_expired(now) {
            let _ = self.force_logout(generation, LogoutCause::Expired).await;
            return TickOutcome::Expired;
        }

        let remaining = record.remaining(now);
        if remaining < self.settings.warning_threshold() {
            let _ = self.signals.send(SessionSignal::ExpiryWarning { remaining });
        }
        if remaining >= self.settings.refresh_threshold() {
            return TickOutcome::Healthy { remaining };
        }

        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return TickOutcome::Superseded;
            }
            state.phase = SessionPhase::Refreshing;
        }
        self.publish_status();
        let _ = self.signals.send(SessionSignal::Refreshing);
        debug!(remaining_s = remaining.as_secs(), "refreshing session");

        match self.auth.refresh_session(&record).await {
            Ok(fresh) => {
                let expires_at = fresh.expires_at();
                if !self.install(Some(fresh), Some(generation)) {
                    debug!("refreshed session discarded, session changed meanwhile");
                    return TickOutcome::Superseded;
                }
                info!(%expires_at, "session refreshed");
                let _ = self.signals.send(SessionSignal::Refreshed { expires_at });
                TickOutcome::Refreshed
            }
            Err(error) => {
                {
                    let mut state = self.state.lock();
                    if state.generation != generation {
                        return TickOutcome::Superseded;
                    }
                    state.phase = SessionPhase::Active;
                }
                self.publish_status();
                warn!(error = %error, kind = error.error_kind(), "session refresh failed, retrying next tick");
                let _ = self.signals.send(SessionSignal::RefreshFailed {
                    error: error.clone(),
                });
                TickOutcome::RefreshFailed(error)
            }
        }
    }

    /// Drop the session, stop the timer, and optionally sign out remotely.
    async fn force_logout(&self, generation: u64, cause: LogoutCause) -> bool {
        {
            let mut state = self.state.lock();
            if state.disposed || state.generation != generation || state.record.is_none() {
                return false;
            }
            state.generation += 1;
            state.record = None;
            state.phase = SessionPhase::Expired;
            state.stop_timer();
        }
        self.publish_status();

        let signal = match cause {
            LogoutCause::Expired => SessionSignal::Expired,
            LogoutCause::Invalidated => SessionSignal::Invalidated,
        };
        warn!(?cause, "session ended, logging out");
        let _ = self.signals.send(signal);

        if self.settings.sign_out_on_expiry {
            if let Err(err) = self.auth.sign_out().await {
                warn!(error = %err, kind = err.error_kind(), "remote sign-out failed");
            }
        }
        true
    }
}

#[async_trait]
impl Heartbeat for Inner {
    async fn beat(self: Arc<Self>) -> ControlFlow<()> {
        match self.tick().await {
            TickOutcome::Expired => ControlFlow::Break(()),
            _ => ControlFlow::Continue(()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
