//! In-memory contour database for testing.
//!
//! Simulates one contour's database end to end: business tables, the
//! capture layer (version stamping, outbox rows, loop suppression), the
//! outbox drain with leases, and the processed-event ledger. The local
//! write methods behave like writes through the triggers; the
//! [`ChangeApplier`] implementation behaves like a consumer session with
//! the origin GUC set, so its writes never reach the outbox.
//!
//! # Panics
//!
//! Methods may panic if internal locks are poisoned. This is acceptable
//! for test code but this adapter should NOT be used in production.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::domain::{
    pk_text, resolve, ChangeEvent, ConflictDecision, ConflictPolicy, EventId, Operation,
    ReplicationError,
};
use crate::ports::{
    ApplyOutcome, ChangeApplier, OutboxEntry, OutboxLease, OutboxStore, ProcessedEventLedger,
};

#[derive(Debug, Clone)]
struct OutboxRow {
    id: i64,
    table_name: String,
    operation: Operation,
    record_data: JsonValue,
    created_at: DateTime<Utc>,
    published: bool,
}

#[derive(Debug, Default)]
struct DatabaseState {
    tables: HashMap<String, BTreeMap<String, JsonValue>>,
    outbox: Vec<OutboxRow>,
    next_outbox_id: i64,
    leased: HashSet<i64>,
    ledger: HashMap<String, DateTime<Utc>>,
}

/// In-memory database simulating one contour.
pub struct InMemoryDatabase {
    contour: String,
    state: Arc<Mutex<DatabaseState>>,
}

impl InMemoryDatabase {
    /// Creates an empty database for the named contour.
    pub fn new(contour: impl Into<String>) -> Self {
        Self {
            contour: contour.into(),
            state: Arc::new(Mutex::new(DatabaseState {
                next_outbox_id: 1,
                ..DatabaseState::default()
            })),
        }
    }

    // === Local write path (trigger semantics) ===

    /// Local INSERT: stamps version (supplied or 1), updated_at and
    /// updated_by, stores the row, and captures an outbox entry.
    pub fn insert(&self, table: &str, mut row: JsonValue) -> Result<(), ReplicationError> {
        let key = row_key(&row)?;
        let mut state = self.state.lock().expect("lock poisoned");

        let table_rows = state.tables.entry(table.to_string()).or_default();
        if table_rows.contains_key(&key) {
            return Err(ReplicationError::database(format!(
                "duplicate key {key} in {table}"
            )));
        }

        let object = row
            .as_object_mut()
            .ok_or_else(|| ReplicationError::malformed("row is not an object"))?;
        let version = object
            .get("version")
            .and_then(JsonValue::as_i64)
            .filter(|v| *v >= 1)
            .unwrap_or(1);
        object.insert("version".to_string(), json!(version));
        object.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        object.insert("updated_by".to_string(), json!(self.contour.clone()));

        state
            .tables
            .get_mut(table)
            .expect("entry created above")
            .insert(key, row.clone());
        capture(&mut state, table, Operation::Insert, row);
        Ok(())
    }

    /// Local UPDATE: merges `changes`, bumps the version, stamps
    /// updated_at/updated_by, and captures an outbox entry with both
    /// images.
    pub fn update(
        &self,
        table: &str,
        key: &str,
        changes: JsonValue,
    ) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().expect("lock poisoned");

        let before = state
            .tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
            .ok_or_else(|| ReplicationError::database(format!("no row {key} in {table}")))?;

        let mut after = before.clone();
        let object = after
            .as_object_mut()
            .ok_or_else(|| ReplicationError::malformed("row is not an object"))?;
        if let Some(changed) = changes.as_object() {
            for (column, value) in changed {
                object.insert(column.clone(), value.clone());
            }
        }
        let version = before.get("version").and_then(JsonValue::as_i64).unwrap_or(0);
        object.insert("version".to_string(), json!(version + 1));
        object.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
        object.insert("updated_by".to_string(), json!(self.contour.clone()));

        state
            .tables
            .get_mut(table)
            .expect("row existed above")
            .insert(key.to_string(), after.clone());
        capture(
            &mut state,
            table,
            Operation::Update,
            json!({"before": before, "after": after}),
        );
        Ok(())
    }

    /// Local DELETE: removes the row and captures its pre-image.
    pub fn delete(&self, table: &str, key: &str) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().expect("lock poisoned");

        let before = state
            .tables
            .get_mut(table)
            .and_then(|rows| rows.remove(key))
            .ok_or_else(|| ReplicationError::database(format!("no row {key} in {table}")))?;
        capture(&mut state, table, Operation::Delete, before);
        Ok(())
    }

    // === Test helpers ===

    /// Injects a raw outbox row, bypassing the capture path. Lets tests
    /// exercise payload shapes the triggers would never produce.
    pub fn seed_outbox(&self, table: &str, operation: Operation, record_data: JsonValue) {
        let mut state = self.state.lock().expect("lock poisoned");
        capture(&mut state, table, operation, record_data);
    }

    /// Returns a stored row by key.
    pub fn row(&self, table: &str, key: &str) -> Option<JsonValue> {
        self.state
            .lock()
            .expect("lock poisoned")
            .tables
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
    }

    /// Number of rows in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .tables
            .get(table)
            .map_or(0, BTreeMap::len)
    }

    /// Total outbox rows ever captured.
    pub fn outbox_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").outbox.len()
    }

    /// Outbox rows not yet marked published.
    pub fn unpublished_count(&self) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .outbox
            .iter()
            .filter(|row| !row.published)
            .count()
    }

    /// Outbox rows whose captured image references the given key. Used to
    /// assert loop suppression.
    pub fn outbox_rows_for_key(&self, key: &str) -> usize {
        self.state
            .lock()
            .expect("lock poisoned")
            .outbox
            .iter()
            .filter(|row| {
                let image = row
                    .record_data
                    .get("after")
                    .unwrap_or(&row.record_data);
                image.get("id").map(pk_text).as_deref() == Some(key)
            })
            .count()
    }

    /// Operations captured in outbox order, oldest first.
    pub fn outbox_operations(&self) -> Vec<Operation> {
        self.state
            .lock()
            .expect("lock poisoned")
            .outbox
            .iter()
            .map(|row| row.operation)
            .collect()
    }

    /// Whether the ledger holds an event id.
    pub fn ledger_contains(&self, event_id: &EventId) -> bool {
        self.state
            .lock()
            .expect("lock poisoned")
            .ledger
            .contains_key(event_id.as_str())
    }

    /// Number of ledger entries.
    pub fn ledger_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").ledger.len()
    }
}

fn capture(state: &mut DatabaseState, table: &str, operation: Operation, record_data: JsonValue) {
    let id = state.next_outbox_id;
    state.next_outbox_id += 1;
    state.outbox.push(OutboxRow {
        id,
        table_name: table.to_string(),
        operation,
        record_data,
        created_at: Utc::now(),
        published: false,
    });
}

fn row_key(row: &JsonValue) -> Result<String, ReplicationError> {
    row.get("id")
        .map(pk_text)
        .ok_or_else(|| ReplicationError::malformed("row has no id column"))
}

#[async_trait]
impl OutboxStore for InMemoryDatabase {
    async fn begin_drain(&self, limit: u32) -> Result<Box<dyn OutboxLease>, ReplicationError> {
        let mut state = self.state.lock().expect("lock poisoned");

        let mut entries = Vec::new();
        let mut ids = Vec::new();
        for row in &state.outbox {
            if entries.len() as u32 >= limit {
                break;
            }
            if row.published || state.leased.contains(&row.id) {
                continue;
            }
            ids.push(row.id);
            entries.push(OutboxEntry {
                id: row.id,
                table_name: row.table_name.clone(),
                operation: row.operation,
                record_data: row.record_data.clone(),
                created_at: row.created_at,
            });
        }
        for id in &ids {
            state.leased.insert(*id);
        }

        Ok(Box::new(InMemoryOutboxLease {
            state: Arc::clone(&self.state),
            ids,
            entries,
        }))
    }

    async fn cleanup_published(&self, retention_days: u32) -> Result<u64, ReplicationError> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        let mut state = self.state.lock().expect("lock poisoned");
        let before = state.outbox.len();
        state
            .outbox
            .retain(|row| !(row.published && row.created_at < cutoff));
        Ok((before - state.outbox.len()) as u64)
    }
}

struct InMemoryOutboxLease {
    state: Arc<Mutex<DatabaseState>>,
    ids: Vec<i64>,
    entries: Vec<OutboxEntry>,
}

// A dropped lease releases its rows, mirroring a rolled-back drain
// transaction.
impl Drop for InMemoryOutboxLease {
    fn drop(&mut self) {
        let mut state = self.state.lock().expect("lock poisoned");
        for id in &self.ids {
            state.leased.remove(id);
        }
    }
}

#[async_trait]
impl OutboxLease for InMemoryOutboxLease {
    fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    async fn commit(self: Box<Self>) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().expect("lock poisoned");
        for row in state.outbox.iter_mut() {
            if self.ids.contains(&row.id) {
                row.published = true;
            }
        }
        for id in &self.ids {
            state.leased.remove(id);
        }
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), ReplicationError> {
        let mut state = self.state.lock().expect("lock poisoned");
        for id in &self.ids {
            state.leased.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeApplier for InMemoryDatabase {
    async fn apply(
        &self,
        event: &ChangeEvent,
        policy: ConflictPolicy,
    ) -> Result<ApplyOutcome, ReplicationError> {
        event.validate()?;
        let key = event.key()?;
        let mut state = self.state.lock().expect("lock poisoned");

        if state.ledger.contains_key(event.event_id.as_str()) {
            return Ok(ApplyOutcome::Duplicate);
        }

        let existing_version = state
            .tables
            .get(&event.table)
            .and_then(|rows| rows.get(&key))
            .and_then(|row| row.get("version"))
            .and_then(JsonValue::as_i64);

        let outcome = match event.operation {
            Operation::Insert => match existing_version {
                None => {
                    write_image(&mut state, event, &key)?;
                    ApplyOutcome::Applied
                }
                Some(existing) => {
                    decide_existing(&mut state, event, &key, existing, policy)?
                }
            },
            Operation::Update => match existing_version {
                None => {
                    write_image(&mut state, event, &key)?;
                    ApplyOutcome::Applied
                }
                Some(existing) => {
                    let incoming = event.incoming_version()?;
                    if existing < incoming {
                        write_image(&mut state, event, &key)?;
                        ApplyOutcome::Applied
                    } else {
                        decide_existing(&mut state, event, &key, existing, policy)?
                    }
                }
            },
            Operation::Delete => {
                if let Some(rows) = state.tables.get_mut(&event.table) {
                    rows.remove(&key);
                }
                ApplyOutcome::Applied
            }
        };

        state
            .ledger
            .insert(event.event_id.as_str().to_string(), Utc::now());
        Ok(outcome)
    }
}

fn write_image(
    state: &mut DatabaseState,
    event: &ChangeEvent,
    key: &str,
) -> Result<(), ReplicationError> {
    let image = event
        .after
        .clone()
        .ok_or_else(|| ReplicationError::malformed("operation carries no post-image"))?;
    state
        .tables
        .entry(event.table.clone())
        .or_default()
        .insert(key.to_string(), image);
    Ok(())
}

fn decide_existing(
    state: &mut DatabaseState,
    event: &ChangeEvent,
    key: &str,
    existing: i64,
    policy: ConflictPolicy,
) -> Result<ApplyOutcome, ReplicationError> {
    let incoming = event.incoming_version()?;
    match resolve(existing, incoming, policy) {
        ConflictDecision::Overwrite => {
            write_image(state, event, key)?;
            Ok(ApplyOutcome::Applied)
        }
        ConflictDecision::KeepExisting => Ok(ApplyOutcome::ConflictSkipped),
        ConflictDecision::Fail => Err(ReplicationError::Conflict {
            table: event.table.clone(),
            key: key.to_string(),
            existing,
            incoming,
        }),
    }
}

#[async_trait]
impl ProcessedEventLedger for InMemoryDatabase {
    async fn contains(&self, event_id: &EventId) -> Result<bool, ReplicationError> {
        Ok(self.ledger_contains(event_id))
    }

    async fn prune(&self, retention_days: u32) -> Result<u64, ReplicationError> {
        let cutoff = Utc::now() - ChronoDuration::days(i64::from(retention_days));
        let mut state = self.state.lock().expect("lock poisoned");
        let before = state.ledger.len();
        state.ledger.retain(|_, processed_at| *processed_at >= cutoff);
        Ok((before - state.ledger.len()) as u64)
    }
}
