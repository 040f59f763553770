//! PostgreSQL implementation of the processed-event ledger.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::{EventId, ReplicationError};
use crate::ports::ProcessedEventLedger;

/// PostgreSQL implementation of [`ProcessedEventLedger`].
#[derive(Clone)]
pub struct PostgresProcessedEventLedger {
    pool: PgPool,
}

impl PostgresProcessedEventLedger {
    /// Creates a ledger over any pool; these statements are outside the
    /// applier's transaction and carry no session requirements.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedEventLedger for PostgresProcessedEventLedger {
    async fn contains(&self, event_id: &EventId) -> Result<bool, ReplicationError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM processed_events WHERE event_id = $1) AS seen",
        )
        .bind(event_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(ReplicationError::database)?;
        row.try_get("seen").map_err(ReplicationError::database)
    }

    async fn prune(&self, retention_days: u32) -> Result<u64, ReplicationError> {
        let row = sqlx::query("SELECT replication_cleanup_ledger($1) AS removed")
            .bind(retention_days as i32)
            .fetch_one(&self.pool)
            .await
            .map_err(ReplicationError::database)?;
        let removed: i64 = row.try_get("removed").map_err(ReplicationError::database)?;
        Ok(removed.max(0) as u64)
    }
}
