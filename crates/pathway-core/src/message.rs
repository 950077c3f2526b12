//! Career-chat messages.
//!
//! The Data Service stores message metadata as an open JSON bag. It is
//! narrowed to [`MessageMetadata`] once, at deserialization, so downstream
//! code never touches untyped fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::MalformedMessage;
use crate::ids::{MessageId, SessionId};

/// Who produced a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageRole {
    /// The person being mentored.
    User,
    /// The guidance bot asking questions.
    Bot,
    /// System notices.
    System,
    /// Final career recommendation.
    Recommendation,
    /// Marker closing the conversation.
    SessionEnd,
}

/// Known metadata shapes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum MessageMetadata {
    /// The message belongs to a question category (e.g. `"skills"`).
    Category {
        /// Category label assigned by the server.
        value: String,
    },
    /// The message carries the final recommendation.
    Recommendation,
    /// Nothing the progress tracker cares about.
    #[default]
    None,
}

impl MessageMetadata {
    /// Category metadata.
    pub fn category(value: impl Into<String>) -> Self {
        Self::Category {
            value: value.into(),
        }
    }

    /// Narrow a raw metadata bag.
    ///
    /// Accepts the loose form (`{"category": "skills"}`,
    /// `{"isRecommendation": true}`) and the tagged form
    /// (`{"kind": "category", "value": "skills"}`). A recommendation flag
    /// wins over a category. Unknown keys are ignored.
    pub fn from_value(raw: &Value) -> Result<Self, MalformedMessage> {
        let map = match raw {
            Value::Null => return Ok(Self::None),
            Value::Object(map) => map,
            _ => return Err(MalformedMessage::new("metadata", "expected an object")),
        };

        if let Some(kind) = map.get("kind") {
            return Self::from_tagged(kind, map);
        }

        match map.get("isRecommendation") {
            None | Some(Value::Null) | Some(Value::Bool(false)) => {}
            Some(Value::Bool(true)) => return Ok(Self::Recommendation),
            Some(_) => {
                return Err(MalformedMessage::new(
                    "isRecommendation",
                    "expected a boolean",
                ));
            }
        }

        category_field(map.get("category"), "category")
    }

    fn from_tagged(kind: &Value, map: &Map<String, Value>) -> Result<Self, MalformedMessage> {
        match kind.as_str() {
            Some("category") => category_field(map.get("value"), "value"),
            Some("recommendation") => Ok(Self::Recommendation),
            Some("none") => Ok(Self::None),
            Some(other) => Err(MalformedMessage::new(
                "kind",
                format!("unknown kind `{other}`"),
            )),
            None => Err(MalformedMessage::new("kind", "expected a string")),
        }
    }

    /// Category label, if any.
    pub fn category_value(&self) -> Option<&str> {
        match self {
            Self::Category { value } => Some(value),
            _ => None,
        }
    }

    /// Whether this marks the final recommendation.
    pub fn is_recommendation(&self) -> bool {
        matches!(self, Self::Recommendation)
    }
}

fn category_field(field: Option<&Value>, name: &str) -> Result<MessageMetadata, MalformedMessage> {
    match field {
        None | Some(Value::Null) => Ok(MessageMetadata::None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(MessageMetadata::None),
        Some(Value::String(s)) => Ok(MessageMetadata::category(s.trim())),
        Some(_) => Err(MalformedMessage::new(name, "expected a string")),
    }
}

impl From<Value> for MessageMetadata {
    /// Lenient conversion: malformed metadata becomes [`MessageMetadata::None`].
    fn from(raw: Value) -> Self {
        Self::from_value(&raw).unwrap_or_default()
    }
}

impl From<MessageMetadata> for Value {
    fn from(meta: MessageMetadata) -> Self {
        match meta {
            MessageMetadata::Category { value } => serde_json::json!({ "category": value }),
            MessageMetadata::Recommendation => serde_json::json!({ "isRecommendation": true }),
            MessageMetadata::None => Value::Object(Map::new()),
        }
    }
}

impl Serialize for MessageMetadata {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MessageMetadata {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

/// One entry in a chat session's append-only log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message ID.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub session_id: SessionId,
    /// Author role.
    pub role: MessageRole,
    /// Text content.
    pub content: String,
    /// Narrowed metadata.
    #[serde(default)]
    pub metadata: MessageMetadata,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message stamped with the current time.
    pub fn new(
        session_id: SessionId,
        role: MessageRole,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            id: MessageId::new(),
            session_id,
            role,
            content: content.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn loose_category() {
        let meta = MessageMetadata::from_value(&json!({"category": "skills"})).unwrap();
        assert_eq!(meta, MessageMetadata::category("skills"));
        assert_eq!(meta.category_value(), Some("skills"));
    }

    #[test]
    fn loose_recommendation_wins_over_category() {
        let meta =
            MessageMetadata::from_value(&json!({"category": "goals", "isRecommendation": true}))
                .unwrap();
        assert!(meta.is_recommendation());
    }

    #[test]
    fn recommendation_false_falls_back_to_category() {
        let meta =
            MessageMetadata::from_value(&json!({"category": "goals", "isRecommendation": false}))
                .unwrap();
        assert_eq!(meta, MessageMetadata::category("goals"));
    }

    #[test]
    fn tagged_forms() {
        assert_eq!(
            MessageMetadata::from_value(&json!({"kind": "category", "value": "education"}))
                .unwrap(),
            MessageMetadata::category("education")
        );
        assert_eq!(
            MessageMetadata::from_value(&json!({"kind": "recommendation"})).unwrap(),
            MessageMetadata::Recommendation
        );
        assert_eq!(
            MessageMetadata::from_value(&json!({"kind": "none"})).unwrap(),
            MessageMetadata::None
        );
    }

    #[test]
    fn missing_or_empty_is_none() {
        assert_eq!(
            MessageMetadata::from_value(&Value::Null).unwrap(),
            MessageMetadata::None
        );
        assert_eq!(
            MessageMetadata::from_value(&json!({})).unwrap(),
            MessageMetadata::None
        );
        assert_eq!(
            MessageMetadata::from_value(&json!({"category": "  "})).unwrap(),
            MessageMetadata::None
        );
        assert_eq!(
            MessageMetadata::from_value(&json!({"other": 1})).unwrap(),
            MessageMetadata::None
        );
    }

    #[test]
    fn wrong_shapes_are_malformed() {
        assert!(MessageMetadata::from_value(&json!("skills")).is_err());
        assert!(MessageMetadata::from_value(&json!({"category": 3})).is_err());
        assert!(MessageMetadata::from_value(&json!({"isRecommendation": "yes"})).is_err());
        assert!(MessageMetadata::from_value(&json!({"kind": "weird"})).is_err());
    }

    #[test]
    fn lenient_conversion_maps_malformed_to_none() {
        let meta = MessageMetadata::from(json!({"category": 3}));
        assert_eq!(meta, MessageMetadata::None);
    }

    #[test]
    fn chat_message_deserializes_from_wire() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": "m1",
            "sessionId": "s1",
            "role": "bot",
            "content": "What skills do you have?",
            "metadata": {"category": "skills", "step": 3},
            "createdAt": "2026-03-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(msg.role, MessageRole::Bot);
        assert_eq!(msg.metadata, MessageMetadata::category("skills"));
    }

    #[test]
    fn chat_message_without_metadata() {
        let msg: ChatMessage = serde_json::from_value(json!({
            "id": "m2",
            "sessionId": "s1",
            "role": "sessionEnd",
            "content": "",
            "createdAt": "2026-03-01T10:00:00Z",
        }))
        .unwrap();
        assert_eq!(msg.role, MessageRole::SessionEnd);
        assert_eq!(msg.metadata, MessageMetadata::None);
    }

    #[test]
    fn metadata_serializes_to_loose_form() {
        let value = serde_json::to_value(MessageMetadata::Recommendation).unwrap();
        assert_eq!(value, json!({"isRecommendation": true}));
        let value = serde_json::to_value(MessageMetadata::category("goals")).unwrap();
        assert_eq!(value, json!({"category": "goals"}));
    }
}
