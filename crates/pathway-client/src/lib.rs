//! # pathway-client
//!
//! Entry point for hosts embedding the Pathway client core.
//!
//! - [`ClientCore`]: builds the realtime manager, session coordinator, and
//!   chat feed from [`PathwaySettings`] and injected Data Service adapters
//! - [`ChatFeed`]: pumps chat messages into per-session progress trackers
//! - [`init`]: loads settings and installs logging
//!
//! [`PathwaySettings`]: pathway_settings::PathwaySettings

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod feed;

pub use client::{ClientCore, init};
pub use errors::ClientError;
pub use feed::{ChatFeed, ChatSource};
