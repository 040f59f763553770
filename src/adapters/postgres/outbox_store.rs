//! PostgreSQL implementation of the outbox store.
//!
//! A drain opens a transaction and leases unpublished rows with
//! `FOR UPDATE SKIP LOCKED`, so any number of publisher instances can
//! drain the same queue: each row has exactly one leaseholder at a time
//! and a crashed instance's rows come back the moment its transaction
//! aborts.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::{Operation, ReplicationError};
use crate::ports::{OutboxEntry, OutboxLease, OutboxStore};

/// PostgreSQL implementation of [`OutboxStore`].
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    /// Creates a store over the publisher pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn begin_drain(&self, limit: u32) -> Result<Box<dyn OutboxLease>, ReplicationError> {
        let mut tx = self.pool.begin().await.map_err(ReplicationError::database)?;

        let rows = sqlx::query(
            r#"
            SELECT id, table_name, operation, record_data, created_at
            FROM replication_queue
            WHERE NOT published
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&mut *tx)
        .await
        .map_err(ReplicationError::database)?;

        let entries = rows
            .into_iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(PostgresOutboxLease { tx, entries }))
    }

    async fn cleanup_published(&self, retention_days: u32) -> Result<u64, ReplicationError> {
        let row = sqlx::query("SELECT replication_cleanup_outbox($1) AS removed")
            .bind(retention_days as i32)
            .fetch_one(&self.pool)
            .await
            .map_err(ReplicationError::database)?;
        let removed: i64 = row.try_get("removed").map_err(ReplicationError::database)?;
        Ok(removed.max(0) as u64)
    }
}

struct PostgresOutboxLease {
    tx: Transaction<'static, Postgres>,
    entries: Vec<OutboxEntry>,
}

#[async_trait]
impl OutboxLease for PostgresOutboxLease {
    fn entries(&self) -> &[OutboxEntry] {
        &self.entries
    }

    async fn commit(mut self: Box<Self>) -> Result<(), ReplicationError> {
        let ids: Vec<i64> = self.entries.iter().map(|e| e.id).collect();
        if !ids.is_empty() {
            sqlx::query(
                "UPDATE replication_queue SET published = TRUE, published_at = now() WHERE id = ANY($1)",
            )
            .bind(&ids)
            .execute(&mut *self.tx)
            .await
            .map_err(ReplicationError::database)?;
        }
        self.tx.commit().await.map_err(ReplicationError::database)
    }

    async fn abort(self: Box<Self>) -> Result<(), ReplicationError> {
        self.tx.rollback().await.map_err(ReplicationError::database)
    }
}

fn entry_from_row(row: PgRow) -> Result<OutboxEntry, ReplicationError> {
    let operation: String = row.try_get("operation").map_err(ReplicationError::database)?;
    Ok(OutboxEntry {
        id: row.try_get("id").map_err(ReplicationError::database)?,
        table_name: row
            .try_get("table_name")
            .map_err(ReplicationError::database)?,
        operation: operation.parse::<Operation>()?,
        record_data: row
            .try_get::<JsonValue, _>("record_data")
            .map_err(ReplicationError::database)?,
        created_at: row
            .try_get("created_at")
            .map_err(ReplicationError::database)?,
    })
}
