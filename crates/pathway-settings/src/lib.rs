//! # pathway-settings
//!
//! Layered configuration for the Pathway client core.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`PathwaySettings::default()`]
//! 2. **User file**: `~/.pathway/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PATHWAY_*` overrides (highest priority)
//!
//! Unlike a process-wide singleton, the loaded value is handed to each
//! component at construction so tests can build components with their own
//! settings.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
