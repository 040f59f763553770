//! PostgreSQL adapters: connection pools with session discipline, the
//! outbox store, the change applier, and the processed-event ledger.

mod applier;
mod ledger;
mod outbox_store;

pub use applier::PostgresChangeApplier;
pub use ledger::PostgresProcessedEventLedger;
pub use outbox_store::PostgresOutboxStore;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;

use crate::config::DatabaseConfig;
use crate::domain::ReplicationError;

/// Builds the pool used by the publisher and the janitor. Writes through
/// this pool are captured by the triggers like any other local writer's.
pub async fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, ReplicationError> {
    pool_options(config)
        .connect(&config.url)
        .await
        .map_err(ReplicationError::database)
}

/// Builds the consumer pool. Every connection declares the session origin
/// before first use, so the capture triggers ignore writes made through
/// it; without this, applied remote changes would re-enter the outbox and
/// storm back across the bus.
pub async fn connect_consumer_pool(config: &DatabaseConfig) -> Result<PgPool, ReplicationError> {
    let set_origin = format!(
        "SET {} = '{}'",
        config.origin_parameter,
        config.consumer_origin.replace('\'', "''")
    );

    pool_options(config)
        .after_connect(move |conn, _meta| {
            let set_origin = set_origin.clone();
            Box::pin(async move {
                conn.execute(set_origin.as_str()).await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .map_err(ReplicationError::database)
}

/// Applies embedded migrations (service tables, trigger functions,
/// maintenance routines).
pub async fn run_migrations(pool: &PgPool) -> Result<(), ReplicationError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(ReplicationError::database)
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(config.idle_timeout())
        .max_lifetime(config.max_lifetime())
}
