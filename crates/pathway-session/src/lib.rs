//! # pathway-session
//!
//! Keeps the client's authentication session alive.
//!
//! [`SessionLifecycleCoordinator`] owns the current [`SessionRecord`] and a
//! single heartbeat timer. Each tick checks the time until expiry, refreshes
//! through [`AuthApi`] when it drops under the refresh threshold, and logs the
//! user out once expiry is observed. A failed refresh never logs out.
//!
//! [`SessionRecord`]: pathway_core::SessionRecord

#![deny(unsafe_code)]

pub mod auth;
pub mod coordinator;
pub mod errors;
pub mod status;
pub mod timer;

pub use auth::{AuthApi, AuthEvent};
pub use coordinator::{SessionLifecycleCoordinator, TickOutcome};
pub use errors::RefreshError;
pub use status::{SessionPhase, SessionSignal, SessionStatus};
pub use timer::TimerState;
