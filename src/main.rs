//! contour-sync entry point.
//!
//! Hosts one contour's Publisher, Consumer, and optional Janitor. The
//! process refuses to start on invalid configuration, drains gracefully
//! on SIGINT/SIGTERM, and logs final counter snapshots on exit.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use contour_sync::adapters::kafka::{KafkaMessageConsumer, KafkaMessageProducer};
use contour_sync::adapters::postgres::{
    connect_consumer_pool, connect_pool, run_migrations, PostgresChangeApplier,
    PostgresOutboxStore, PostgresProcessedEventLedger,
};
use contour_sync::application::{
    wait_for_termination, Consumer, Janitor, Publisher, ShutdownSignal,
};
use contour_sync::config::AppConfig;
use contour_sync::domain::EventSource;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("fatal: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    init_tracing();
    info!(
        contour = %config.contour.name,
        tables = ?config.replication.tables,
        "starting contour-sync"
    );

    let pool = connect_pool(&config.database).await?;
    if config.database.run_migrations {
        run_migrations(&pool).await?;
        info!("migrations applied");
    }
    let consumer_pool = connect_consumer_pool(&config.database).await?;

    let outbox = Arc::new(PostgresOutboxStore::new(pool.clone()));
    let ledger = Arc::new(PostgresProcessedEventLedger::new(pool.clone()));
    let applier = Arc::new(PostgresChangeApplier::new(consumer_pool));

    let producer = Arc::new(KafkaMessageProducer::from_config(&config.kafka)?);
    let topics = config.replication.topics();
    let bus_consumer = Arc::new(KafkaMessageConsumer::from_config(&config.kafka, &topics)?);

    let source = EventSource::new(
        config.contour.name.clone(),
        config.contour.database.clone(),
    );

    let publisher = Arc::new(Publisher::new(
        outbox.clone(),
        producer,
        source,
        config.publisher.clone(),
    ));
    let consumer = Arc::new(Consumer::new(
        bus_consumer,
        applier,
        config.contour.name.clone(),
        config.consumer.clone(),
    ));

    let shutdown = ShutdownSignal::new();
    let mut tasks = Vec::new();

    {
        let publisher = publisher.clone();
        let receiver = shutdown.subscribe();
        tasks.push(tokio::spawn(async move { publisher.run(receiver).await }));
    }
    {
        let consumer = consumer.clone();
        let receiver = shutdown.subscribe();
        tasks.push(tokio::spawn(async move { consumer.run(receiver).await }));
    }
    if config.janitor.enabled {
        let janitor = Janitor::new(outbox, ledger, config.janitor.clone());
        let receiver = shutdown.subscribe();
        tasks.push(tokio::spawn(async move { janitor.run(receiver).await }));
    }

    wait_for_termination().await?;
    info!("termination signal received, draining");
    shutdown.trigger();

    if tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(tasks))
        .await
        .is_err()
    {
        warn!("grace period elapsed before all services stopped");
    }

    let published = publisher.metrics();
    let applied = consumer.metrics();
    info!(
        published = published.processed,
        publish_failures = published.failed,
        applied = applied.processed,
        skipped = applied.skipped,
        failed = applied.failed,
        "contour-sync stopped"
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
