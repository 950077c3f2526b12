//! Row-level change notifications pushed by the Data Service.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::CoreError;

/// Kind of row change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
}

/// Row images attached to a change.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangePayload {
    /// Row after the change (absent for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Value>,
    /// Row before the change (usually only the primary key for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
}

/// A single table-change event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TableChange {
    /// Database schema (normally `"public"`).
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Kind of change.
    #[serde(rename = "eventType")]
    pub kind: ChangeKind,
    /// Row images.
    #[serde(default)]
    pub payload: ChangePayload,
}

impl TableChange {
    /// Change in the `public` schema.
    pub fn new(table: impl Into<String>, kind: ChangeKind, payload: ChangePayload) -> Self {
        Self {
            schema: "public".to_string(),
            table: table.into(),
            kind,
            payload,
        }
    }

    /// The most relevant row image: `new` when present, otherwise `old`.
    pub fn row(&self) -> Option<&Value> {
        self.payload.new.as_ref().or(self.payload.old.as_ref())
    }

    /// A column of [`Self::row`].
    pub fn column(&self, name: &str) -> Option<&Value> {
        self.row()?.get(name)
    }
}

/// Server-style row filter (`column=eq.value`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RowFilter {
    /// Every row.
    #[default]
    All,
    /// Rows whose `column` equals `value` (compared as text).
    Eq {
        /// Column name.
        column: String,
        /// Expected value.
        value: String,
    },
}

impl RowFilter {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether `change` passes the filter.
    ///
    /// A row lacking the filtered column does not match, except for deletes:
    /// their old image usually carries only the primary key.
    pub fn matches(&self, change: &TableChange) -> bool {
        match self {
            Self::All => true,
            Self::Eq { column, value } => match change.column(column) {
                Some(actual) => value_as_text(actual).as_deref() == Some(value.as_str()),
                None => change.kind == ChangeKind::Delete,
            },
        }
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl FromStr for RowFilter {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "*" {
            return Ok(Self::All);
        }
        let (column, rest) = s
            .split_once('=')
            .ok_or_else(|| CoreError::InvalidFilter(s.to_string()))?;
        let value = rest
            .strip_prefix("eq.")
            .ok_or_else(|| CoreError::InvalidFilter(s.to_string()))?;
        if column.is_empty() {
            return Err(CoreError::InvalidFilter(s.to_string()));
        }
        Ok(Self::eq(column, value))
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Eq { column, value } => write!(f, "{column}=eq.{value}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
