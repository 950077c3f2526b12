//! # pathway-core
//!
//! Foundation types shared by the Pathway real-time client crates.
//!
//! - **Branded IDs**: `UserId`, `SessionId`, `MessageId`, `ChannelId` as newtypes
//! - **Sessions**: [`SessionRecord`] with the `expires_at > issued_at` invariant
//! - **Chat**: [`ChatMessage`] and the [`MessageMetadata`] tagged union
//! - **Change events**: [`TableChange`] and [`RowFilter`] for row-level notifications
//! - **Clocks**: [`Clock`] abstraction over wall-clock time
//! - **Errors**: [`CoreError`] and [`MalformedMessage`] via `thiserror`

#![deny(unsafe_code)]

pub mod change;
pub mod clock;
pub mod errors;
pub mod ids;
pub mod message;
pub mod session;

pub use change::{ChangeKind, ChangePayload, RowFilter, TableChange};
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{CoreError, MalformedMessage};
pub use ids::{ChannelId, MessageId, SessionId, UserId};
pub use message::{ChatMessage, MessageMetadata, MessageRole};
pub use session::SessionRecord;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
