//! PostgreSQL implementation of the change applier.
//!
//! The applier writes remote row images without per-table typed models:
//! SQL is generated from the image's column names (whitelisted) and the
//! values are handed to PostgreSQL as one `jsonb` document through
//! `jsonb_populate_record`, which casts each field to the table's column
//! type. Rows are matched on `id::text` against the event's key string,
//! the same projection that keys the bus partition.
//!
//! One `apply` call is one transaction: deferred constraints, ledger
//! dedupe probe, version-checked DML under `FOR UPDATE`, ledger insert,
//! commit. The pool behind this adapter must be the consumer pool so the
//! capture triggers stay silent.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::domain::{
    is_safe_identifier, resolve, ChangeEvent, ConflictDecision, ConflictPolicy, Operation,
    ReplicationError,
};
use crate::ports::{ApplyOutcome, ChangeApplier};

/// PostgreSQL implementation of [`ChangeApplier`].
#[derive(Clone)]
pub struct PostgresChangeApplier {
    pool: PgPool,
}

impl PostgresChangeApplier {
    /// Creates an applier over the consumer pool (session origin set).
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn probe_version(
        tx: &mut Transaction<'static, Postgres>,
        table: &str,
        key: &str,
    ) -> Result<Option<i64>, ReplicationError> {
        let sql = probe_sql(table);
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut **tx)
            .await
            .map_err(ReplicationError::database)?;
        match row {
            Some(row) => {
                let version: i64 = row.try_get("version").map_err(ReplicationError::database)?;
                Ok(Some(version))
            }
            None => Ok(None),
        }
    }

    async fn insert_row(
        tx: &mut Transaction<'static, Postgres>,
        table: &str,
        image: &JsonValue,
    ) -> Result<(), ReplicationError> {
        let columns = column_list(image)?;
        let sql = insert_sql(table, &columns);
        sqlx::query(&sql)
            .bind(image)
            .execute(&mut **tx)
            .await
            .map_err(map_dml_error)?;
        Ok(())
    }

    async fn update_row(
        tx: &mut Transaction<'static, Postgres>,
        table: &str,
        key: &str,
        image: &JsonValue,
    ) -> Result<(), ReplicationError> {
        let columns = column_list(image)?;
        let sql = update_sql(table, &columns);
        sqlx::query(&sql)
            .bind(image)
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(map_dml_error)?;
        Ok(())
    }

    async fn delete_row(
        tx: &mut Transaction<'static, Postgres>,
        table: &str,
        key: &str,
    ) -> Result<(), ReplicationError> {
        let sql = delete_sql(table);
        sqlx::query(&sql)
            .bind(key)
            .execute(&mut **tx)
            .await
            .map_err(map_dml_error)?;
        Ok(())
    }

    /// Resolves a collision with an existing row and performs the
    /// decided write, if any.
    async fn resolve_existing(
        tx: &mut Transaction<'static, Postgres>,
        event: &ChangeEvent,
        key: &str,
        existing: i64,
        policy: ConflictPolicy,
    ) -> Result<ApplyOutcome, ReplicationError> {
        let incoming = event.incoming_version()?;
        match resolve(existing, incoming, policy) {
            ConflictDecision::Overwrite => {
                let after = post_image(event)?;
                Self::update_row(tx, &event.table, key, after).await?;
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

    async fn apply_operation(
        tx: &mut Transaction<'static, Postgres>,
        event: &ChangeEvent,
        key: &str,
        policy: ConflictPolicy,
    ) -> Result<ApplyOutcome, ReplicationError> {
        match event.operation {
            Operation::Insert => match Self::probe_version(tx, &event.table, key).await? {
                None => {
                    Self::insert_row(tx, &event.table, post_image(event)?).await?;
                    Ok(ApplyOutcome::Applied)
                }
                // The row already exists: a replayed INSERT or a key
                // written on both contours. The policy decides.
                Some(existing) => Self::resolve_existing(tx, event, key, existing, policy).await,
            },
            Operation::Update => match Self::probe_version(tx, &event.table, key).await? {
                // Out-of-order arrival: creating the row is the
                // convergent choice; the eventual INSERT resolves as a
                // conflict against it.
                None => {
                    Self::insert_row(tx, &event.table, post_image(event)?).await?;
                    Ok(ApplyOutcome::Applied)
                }
                Some(existing) => {
                    let incoming = event.incoming_version()?;
                    if existing < incoming {
                        Self::update_row(tx, &event.table, key, post_image(event)?).await?;
                        Ok(ApplyOutcome::Applied)
                    } else {
                        Self::resolve_existing(tx, event, key, existing, policy).await
                    }
                }
            },
            Operation::Delete => {
                // Unconditional and idempotent: deleting an absent row is
                // a no-op, and any newer write for the key is either
                // ahead of this delete in the partition or behind it and
                // about to be re-applied.
                Self::delete_row(tx, &event.table, key).await?;
                Ok(ApplyOutcome::Applied)
            }
        }
    }
}

#[async_trait]
impl ChangeApplier for PostgresChangeApplier {
    async fn apply(
        &self,
        event: &ChangeEvent,
        policy: ConflictPolicy,
    ) -> Result<ApplyOutcome, ReplicationError> {
        event.validate()?;
        if !is_safe_identifier(&event.table) {
            return Err(ReplicationError::InvalidIdentifier(event.table.clone()));
        }
        let key = event.key()?;

        let mut tx = self.pool.begin().await.map_err(ReplicationError::database)?;

        // FK checks run at commit so sibling rows can arrive in any order.
        sqlx::query("SET CONSTRAINTS ALL DEFERRED")
            .execute(&mut *tx)
            .await
            .map_err(ReplicationError::database)?;

        // Exactly-once-effect boundary.
        let seen_row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM processed_events WHERE event_id = $1) AS seen",
        )
        .bind(event.event_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(ReplicationError::database)?;
        let seen: bool = seen_row.try_get("seen").map_err(ReplicationError::database)?;
        if seen {
            tx.rollback().await.map_err(ReplicationError::database)?;
            return Ok(ApplyOutcome::Duplicate);
        }

        let outcome = match Self::apply_operation(&mut tx, event, &key, policy).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tx.rollback().await.map_err(ReplicationError::database)?;
                return Err(err);
            }
        };

        sqlx::query("INSERT INTO processed_events (event_id) VALUES ($1)")
            .bind(event.event_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(ReplicationError::database)?;

        // Deferred FK checks run here; a violation the version checks
        // could not resolve surfaces as an integrity error.
        tx.commit().await.map_err(map_dml_error)?;
        Ok(outcome)
    }
}

/// Constraint violations (SQLSTATE class 23) become integrity errors;
/// everything else stays transient.
fn map_dml_error(err: sqlx::Error) -> ReplicationError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().map_or(false, |code| code.starts_with("23")) {
            return ReplicationError::Integrity(db_err.to_string());
        }
    }
    ReplicationError::database(err)
}

/// Sorted, whitelisted column names of a row image.
fn column_list(image: &JsonValue) -> Result<Vec<&str>, ReplicationError> {
    let object = image
        .as_object()
        .ok_or_else(|| ReplicationError::malformed("row image is not an object"))?;
    if object.is_empty() {
        return Err(ReplicationError::malformed("row image has no columns"));
    }
    let mut columns = Vec::with_capacity(object.len());
    for name in object.keys() {
        if !is_safe_identifier(name) {
            return Err(ReplicationError::InvalidIdentifier(name.clone()));
        }
        columns.push(name.as_str());
    }
    Ok(columns)
}

fn post_image(event: &ChangeEvent) -> Result<&JsonValue, ReplicationError> {
    event
        .after
        .as_ref()
        .ok_or_else(|| ReplicationError::malformed("operation carries no post-image"))
}

fn probe_sql(table: &str) -> String {
    format!("SELECT version FROM {table} WHERE id::text = $1 FOR UPDATE")
}

fn insert_sql(table: &str, columns: &[&str]) -> String {
    let column_names = columns.join(", ");
    let selected: Vec<String> = columns.iter().map(|c| format!("r.{c}")).collect();
    format!(
        "INSERT INTO {table} ({column_names}) SELECT {selected} FROM jsonb_populate_record(NULL::{table}, $1) AS r",
        selected = selected.join(", "),
    )
}

fn update_sql(table: &str, columns: &[&str]) -> String {
    let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = r.{c}")).collect();
    format!(
        "UPDATE {table} SET {assignments} FROM jsonb_populate_record(NULL::{table}, $1) AS r WHERE {table}.id::text = $2",
        assignments = assignments.join(", "),
    )
}

fn delete_sql(table: &str) -> String {
    format!("DELETE FROM {table} WHERE id::text = $1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insert_sql_populates_from_jsonb() {
        let sql = insert_sql("users", &["id", "name", "version"]);
        assert_eq!(
            sql,
            "INSERT INTO users (id, name, version) SELECT r.id, r.name, r.version \
             FROM jsonb_populate_record(NULL::users, $1) AS r"
        );
    }

    #[test]
    fn update_sql_assigns_every_column() {
        let sql = update_sql("users", &["id", "name"]);
        assert_eq!(
            sql,
            "UPDATE users SET id = r.id, name = r.name \
             FROM jsonb_populate_record(NULL::users, $1) AS r WHERE users.id::text = $2"
        );
    }

    #[test]
    fn delete_and_probe_match_on_key_text() {
        assert_eq!(delete_sql("users"), "DELETE FROM users WHERE id::text = $1");
        assert_eq!(
            probe_sql("users"),
            "SELECT version FROM users WHERE id::text = $1 FOR UPDATE"
        );
    }

    #[test]
    fn column_list_is_sorted_and_deterministic() {
        let image = json!({"version": 1, "id": 2, "name": "x"});
        let columns = column_list(&image).unwrap();
        assert_eq!(columns, vec!["id", "name", "version"]);
    }

    #[test]
    fn column_list_rejects_unsafe_names() {
        let image = json!({"id": 1, "name; drop table users": "x"});
        let err = column_list(&image).unwrap_err();
        assert!(matches!(err, ReplicationError::InvalidIdentifier(_)));
    }

    #[test]
    fn column_list_rejects_non_object_images() {
        assert!(column_list(&json!([1, 2, 3])).is_err());
        assert!(column_list(&json!({})).is_err());
    }
}
