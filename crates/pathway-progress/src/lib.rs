//! # pathway-progress
//!
//! Turns the append-only career-chat log into a progress summary for the UI:
//! current category, per-category question counts, an overall percentage,
//! and a completion flag.
//!
//! The percentage is a heuristic over a configured `estimated_total`; it
//! never decreases within a session and completion is sticky.

#![deny(unsafe_code)]

pub mod state;
pub mod tracker;

pub use state::{COMPLETE_CATEGORY, ProgressState};
pub use tracker::ConversationProgressTracker;
