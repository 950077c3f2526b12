//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`PathwaySettings::default()`]
//! 2. If `~/.pathway/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::PathwaySettings;

/// Resolve the path to the settings file (`~/.pathway/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".pathway").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<PathwaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON or the result fails validation, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<PathwaySettings> {
    let defaults = serde_json::to_value(PathwaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: PathwaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (falling back to file/default).
pub fn apply_env_overrides(settings: &mut PathwaySettings) {
    // ── Realtime ────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("PATHWAY_RECONNECT_BASE_DELAY_MS", 10, 600_000) {
        settings.realtime.reconnect_base_delay_ms = v;
    }
    if let Some(v) = read_env_u64("PATHWAY_RECONNECT_MAX_DELAY_MS", 10, 3_600_000) {
        settings.realtime.reconnect_max_delay_ms = v;
    }
    if let Some(v) = read_env_u32("PATHWAY_MAX_RECONNECT_ATTEMPTS", 1, 1_000) {
        settings.realtime.max_reconnect_attempts = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("PATHWAY_HEARTBEAT_INTERVAL_MS", 1_000, 3_600_000) {
        settings.session.heartbeat_interval_ms = v;
    }
    if let Some(v) = read_env_u64("PATHWAY_REFRESH_THRESHOLD_MS", 1_000, 86_400_000) {
        settings.session.refresh_threshold_ms = v;
    }
    if let Some(v) = read_env_u64("PATHWAY_WARNING_THRESHOLD_MS", 0, 86_400_000) {
        settings.session.warning_threshold_ms = v;
    }
    if let Some(v) = read_env_bool("PATHWAY_SIGN_OUT_ON_EXPIRY") {
        settings.session.sign_out_on_expiry = v;
    }

    // ── Progress / chat ─────────────────────────────────────────────
    if let Some(v) = read_env_u32("PATHWAY_ESTIMATED_TOTAL", 1, 1_000) {
        settings.progress.estimated_total = v;
    }
    if let Some(v) = read_env_u64("PATHWAY_CHAT_POLL_INTERVAL_MS", 100, 600_000) {
        settings.chat.poll_interval_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("PATHWAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_bool("PATHWAY_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u32` within a range.
pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
