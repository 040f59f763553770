//! Outbox drain port.
//!
//! The capture triggers fill `replication_queue`; the publisher drains it
//! through this port. A drain is transactional: `begin_drain` leases a
//! batch of unpublished rows (skip-locked in the PostgreSQL adapter, so
//! concurrent publisher instances never lease the same row), publication
//! happens while the lease is held, and `commit` marks the rows published
//! atomically with releasing the lease. Any failure aborts the whole
//! batch and the rows come back on the next drain.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};

use crate::domain::{ChangeEvent, EventId, EventSource, Operation, ReplicationError};

/// One captured row change awaiting publication.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    /// Monotonically assigned queue id; drain order.
    pub id: i64,
    pub table_name: String,
    pub operation: Operation,
    /// Captured row payload: a flat row image for INSERT (post) and
    /// DELETE (pre), `{"before": .., "after": ..}` for UPDATE.
    pub record_data: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl OutboxEntry {
    /// Builds the bus event document for this entry, assigning a fresh
    /// event id and stamping the publishing contour.
    pub fn into_change_event(self, source: &EventSource) -> Result<ChangeEvent, ReplicationError> {
        let (before, after) = match self.operation {
            Operation::Insert => (None, Some(self.record_data)),
            Operation::Delete => (Some(self.record_data), None),
            Operation::Update => {
                let mut doc = match self.record_data {
                    JsonValue::Object(map) => map,
                    other => {
                        return Err(ReplicationError::malformed(format!(
                            "UPDATE outbox payload is not an object: {other}"
                        )))
                    }
                };
                let before = doc
                    .remove("before")
                    .ok_or_else(|| ReplicationError::malformed("UPDATE payload missing before image"))?;
                let after = doc
                    .remove("after")
                    .ok_or_else(|| ReplicationError::malformed("UPDATE payload missing after image"))?;
                (Some(before), Some(after))
            }
        };

        let keyed_image = after.as_ref().or(before.as_ref()).ok_or_else(|| {
            ReplicationError::malformed("outbox payload carries no row image")
        })?;
        let id_value = keyed_image
            .get("id")
            .cloned()
            .ok_or_else(|| ReplicationError::malformed("row image has no id column"))?;
        let mut primary_key = Map::new();
        primary_key.insert("id".to_string(), id_value);

        let event = ChangeEvent {
            event_id: EventId::new(),
            timestamp: Utc::now(),
            source: source.clone(),
            table: self.table_name,
            operation: self.operation,
            primary_key,
            before,
            after,
        };
        event.validate()?;
        Ok(event)
    }
}

/// A leased batch of unpublished outbox rows.
///
/// Holding the lease keeps the drain transaction open; the rows stay
/// invisible to other publisher instances until `commit` or `abort`.
#[async_trait]
pub trait OutboxLease: Send {
    /// Leased entries in ascending id order.
    fn entries(&self) -> &[OutboxEntry];

    /// Marks every leased row published and commits the drain transaction.
    async fn commit(self: Box<Self>) -> Result<(), ReplicationError>;

    /// Rolls back the drain transaction, releasing the lease so another
    /// drain can pick the rows up.
    async fn abort(self: Box<Self>) -> Result<(), ReplicationError>;
}

/// Port over the capture outbox.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Leases up to `limit` unpublished rows in ascending id order.
    async fn begin_drain(&self, limit: u32) -> Result<Box<dyn OutboxLease>, ReplicationError>;

    /// Deletes published rows older than the retention window, returning
    /// the number removed.
    async fn cleanup_published(&self, retention_days: u32) -> Result<u64, ReplicationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(operation: Operation, record_data: JsonValue) -> OutboxEntry {
        OutboxEntry {
            id: 1,
            table_name: "users".to_string(),
            operation,
            record_data,
            created_at: Utc::now(),
        }
    }

    fn source() -> EventSource {
        EventSource::new("A", "primary")
    }

    #[test]
    fn insert_entry_maps_to_after_image() {
        let row = json!({"id": 1, "name": "John", "version": 1});
        let event = entry(Operation::Insert, row.clone())
            .into_change_event(&source())
            .unwrap();

        assert_eq!(event.operation, Operation::Insert);
        assert_eq!(event.before, None);
        assert_eq!(event.after, Some(row));
        assert_eq!(event.key().unwrap(), "1");
        assert_eq!(event.source.contour, "A");
        assert_eq!(event.topic(), "users_changes");
    }

    #[test]
    fn delete_entry_maps_to_before_image() {
        let row = json!({"id": 9, "name": "gone", "version": 4});
        let event = entry(Operation::Delete, row.clone())
            .into_change_event(&source())
            .unwrap();

        assert_eq!(event.before, Some(row));
        assert_eq!(event.after, None);
        assert_eq!(event.key().unwrap(), "9");
    }

    #[test]
    fn update_entry_splits_both_images() {
        let payload = json!({
            "before": {"id": 2, "name": "John", "version": 1},
            "after": {"id": 2, "name": "Alice", "version": 2},
        });
        let event = entry(Operation::Update, payload)
            .into_change_event(&source())
            .unwrap();

        assert_eq!(event.before.as_ref().unwrap()["name"], "John");
        assert_eq!(event.after.as_ref().unwrap()["name"], "Alice");
        assert_eq!(event.incoming_version().unwrap(), 2);
    }

    #[test]
    fn fresh_event_id_per_entry() {
        let row = json!({"id": 1, "version": 1});
        let first = entry(Operation::Insert, row.clone())
            .into_change_event(&source())
            .unwrap();
        let second = entry(Operation::Insert, row)
            .into_change_event(&source())
            .unwrap();
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn update_payload_without_images_is_malformed() {
        let err = entry(Operation::Update, json!({"after": {"id": 1}}))
            .into_change_event(&source())
            .unwrap_err();
        assert!(err.is_poison());
    }

    #[test]
    fn row_image_without_id_is_malformed() {
        let err = entry(Operation::Insert, json!({"name": "anonymous", "version": 1}))
            .into_change_event(&source())
            .unwrap_err();
        assert!(err.is_poison());
    }
}
