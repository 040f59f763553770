//! The change event document exchanged over the bus.
//!
//! One event describes one row mutation. The wire shape is fixed:
//! `event_id`, `timestamp`, `source{contour,database}`, `table`,
//! `operation`, `primary_key` (column name → value), and `before`/`after`
//! row images whose presence depends on the operation (INSERT carries
//! `after`, DELETE carries `before`, UPDATE carries both).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::error::ReplicationError;

/// Unique identifier for a change event, used for consumer-side
/// deduplication. String-backed so any UUID-like producer format survives
/// a round trip through the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Creates a fresh random id (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing id string without validation.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the inner string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names the contour and database an event originated on. The consumer
/// compares `contour` against its own identity to drop own-origin events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub contour: String,
    pub database: String,
}

impl EventSource {
    pub fn new(contour: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            contour: contour.into(),
            database: database.into(),
        }
    }
}

/// Row-level DML kind carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Wire form of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ReplicationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(ReplicationError::malformed(format!(
                "unknown operation {other:?}"
            ))),
        }
    }
}

/// Returns the bus topic carrying changes for a table.
pub fn topic_for_table(table: &str) -> String {
    format!("{table}_changes")
}

/// One published change-data record describing a single row mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub source: EventSource,
    pub table: String,
    pub operation: Operation,
    pub primary_key: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<JsonValue>,
}

impl ChangeEvent {
    /// Parses and shape-validates an event from raw bus bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ReplicationError> {
        let event: ChangeEvent = serde_json::from_slice(bytes)
            .map_err(|e| ReplicationError::malformed(format!("invalid event document: {e}")))?;
        event.validate()?;
        Ok(event)
    }

    /// Serializes the event for publication.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ReplicationError> {
        serde_json::to_vec(self)
            .map_err(|e| ReplicationError::malformed(format!("event serialization failed: {e}")))
    }

    /// Enforces the per-operation image contract and the presence of the
    /// canonical primary-key entry.
    pub fn validate(&self) -> Result<(), ReplicationError> {
        if self.table.is_empty() {
            return Err(ReplicationError::malformed("empty table name"));
        }
        match self.operation {
            Operation::Insert => {
                if self.after.is_none() {
                    return Err(ReplicationError::malformed("INSERT event without after image"));
                }
            }
            Operation::Update => {
                if self.before.is_none() || self.after.is_none() {
                    return Err(ReplicationError::malformed(
                        "UPDATE event must carry both before and after images",
                    ));
                }
            }
            Operation::Delete => {
                if self.before.is_none() {
                    return Err(ReplicationError::malformed("DELETE event without before image"));
                }
            }
        }
        if !self.primary_key.contains_key("id") {
            return Err(ReplicationError::malformed(
                "primary_key map has no id entry",
            ));
        }
        Ok(())
    }

    /// Topic this event is published on.
    pub fn topic(&self) -> String {
        topic_for_table(&self.table)
    }

    /// String form of the canonical primary-key value. Doubles as the bus
    /// message key and as the row-probe value on the applying side, so
    /// both ends agree on the partitioning of a row's history.
    pub fn key(&self) -> Result<String, ReplicationError> {
        self.primary_key
            .get("id")
            .map(pk_text)
            .ok_or_else(|| ReplicationError::malformed("primary_key map has no id entry"))
    }

    /// Version stamped on the incoming image (post-image for INSERT and
    /// UPDATE). DELETE events carry no authoritative version.
    pub fn incoming_version(&self) -> Result<i64, ReplicationError> {
        let image = self
            .after
            .as_ref()
            .ok_or_else(|| ReplicationError::malformed("operation carries no post-image"))?;
        image
            .get("version")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| ReplicationError::malformed("post-image has no integer version"))
    }
}

/// Unquoted string form of a primary-key value: JSON strings yield their
/// inner text, every other scalar its JSON rendering.
pub fn pk_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert_event() -> ChangeEvent {
        let mut primary_key = Map::new();
        primary_key.insert("id".to_string(), json!(1));
        ChangeEvent {
            event_id: EventId::from_string("evt-1"),
            timestamp: Utc::now(),
            source: EventSource::new("A", "primary"),
            table: "users".to_string(),
            operation: Operation::Insert,
            primary_key,
            before: None,
            after: Some(json!({"id": 1, "name": "John", "version": 1})),
        }
    }

    // ============================================================
    // Wire shape
    // ============================================================

    #[test]
    fn serializes_with_exact_key_set_for_insert() {
        let event = insert_event();
        let value = serde_json::to_value(&event).unwrap();
        let object = value.as_object().unwrap();
        let mut keys: Vec<_> = object.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["after", "event_id", "operation", "primary_key", "source", "table", "timestamp"]
        );
        assert_eq!(object["operation"], "INSERT");
        assert_eq!(object["source"]["contour"], "A");
        assert_eq!(object["source"]["database"], "primary");
    }

    #[test]
    fn update_event_carries_both_images() {
        let mut event = insert_event();
        event.operation = Operation::Update;
        event.before = Some(json!({"id": 1, "name": "John", "version": 1}));
        event.after = Some(json!({"id": 1, "name": "Alice", "version": 2}));
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("before").is_some());
        assert!(value.get("after").is_some());
        assert_eq!(value["operation"], "UPDATE");
    }

    #[test]
    fn absent_images_are_omitted_not_null() {
        let event = insert_event();
        let text = serde_json::to_string(&event).unwrap();
        assert!(!text.contains("\"before\""));
    }

    #[test]
    fn round_trips_through_bytes() {
        let event = insert_event();
        let bytes = event.to_bytes().unwrap();
        let restored = ChangeEvent::from_bytes(&bytes).unwrap();
        assert_eq!(restored.event_id, event.event_id);
        assert_eq!(restored.table, "users");
        assert_eq!(restored.operation, Operation::Insert);
        assert_eq!(restored.after, event.after);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        let err = ChangeEvent::from_bytes(b"not json").unwrap_err();
        assert!(err.is_poison());
    }

    #[test]
    fn from_bytes_rejects_unknown_operation() {
        let mut value = serde_json::to_value(insert_event()).unwrap();
        value["operation"] = json!("TRUNCATE");
        let err = ChangeEvent::from_bytes(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(err.is_poison());
    }

    // ============================================================
    // Validation
    // ============================================================

    #[test]
    fn validate_rejects_insert_without_after() {
        let mut event = insert_event();
        event.after = None;
        assert!(event.validate().is_err());
    }

    #[test]
    fn validate_rejects_update_with_single_image() {
        let mut event = insert_event();
        event.operation = Operation::Update;
        event.before = None;
        assert!(event.validate().is_err());
    }

    #[test]
    fn validate_rejects_delete_without_before() {
        let mut event = insert_event();
        event.operation = Operation::Delete;
        event.before = None;
        event.after = None;
        assert!(event.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_id_in_primary_key() {
        let mut event = insert_event();
        event.primary_key = Map::new();
        assert!(event.validate().is_err());
    }

    // ============================================================
    // Key projection and versions
    // ============================================================

    #[test]
    fn key_uses_unquoted_string_form() {
        let mut event = insert_event();
        assert_eq!(event.key().unwrap(), "1");

        event
            .primary_key
            .insert("id".to_string(), json!("user-abc"));
        assert_eq!(event.key().unwrap(), "user-abc");
    }

    #[test]
    fn pk_text_forms() {
        assert_eq!(pk_text(&json!(42)), "42");
        assert_eq!(pk_text(&json!("abc")), "abc");
        assert_eq!(pk_text(&json!(true)), "true");
    }

    #[test]
    fn incoming_version_reads_post_image() {
        let event = insert_event();
        assert_eq!(event.incoming_version().unwrap(), 1);
    }

    #[test]
    fn incoming_version_missing_is_malformed() {
        let mut event = insert_event();
        event.after = Some(json!({"id": 1, "name": "John"}));
        assert!(event.incoming_version().unwrap_err().is_poison());
    }

    #[test]
    fn topic_appends_changes_suffix() {
        assert_eq!(topic_for_table("users"), "users_changes");
        assert_eq!(insert_event().topic(), "users_changes");
    }

    #[test]
    fn operation_parses_wire_form() {
        assert_eq!("INSERT".parse::<Operation>().unwrap(), Operation::Insert);
        assert_eq!("DELETE".parse::<Operation>().unwrap(), Operation::Delete);
        assert!("insert".parse::<Operation>().is_err());
    }

    #[test]
    fn event_id_generates_unique_values() {
        assert_ne!(EventId::new(), EventId::new());
    }
}
