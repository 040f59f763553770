//! Janitor - retention cleanup for the outbox and the ledger.
//!
//! Deployments with an external scheduler call the SQL routines from
//! cron; this service covers the rest by running both cleanups on an
//! interval. Ledger retention must exceed the bus redelivery window,
//! which config validation enforces relative to outbox retention.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;
use tracing::{error, info};

use crate::config::JanitorConfig;
use crate::domain::ReplicationError;
use crate::ports::{OutboxStore, ProcessedEventLedger};

/// Background retention service.
pub struct Janitor {
    outbox: Arc<dyn OutboxStore>,
    ledger: Arc<dyn ProcessedEventLedger>,
    config: JanitorConfig,
}

impl Janitor {
    /// Creates a janitor over both retention surfaces.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        ledger: Arc<dyn ProcessedEventLedger>,
        config: JanitorConfig,
    ) -> Self {
        Self {
            outbox,
            ledger,
            config,
        }
    }

    /// Runs cleanup passes until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval());
        info!(
            interval_secs = self.config.interval_secs,
            outbox_retention_days = self.config.outbox_retention_days,
            ledger_retention_days = self.config.ledger_retention_days,
            "janitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("janitor stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(err) = self.run_once().await {
                        error!(error = %err, "retention cleanup failed");
                    }
                }
            }
        }
    }

    /// One cleanup pass over both tables. Returns rows removed from the
    /// outbox and the ledger.
    pub async fn run_once(&self) -> Result<(u64, u64), ReplicationError> {
        let outbox_removed = self.cleanup_outbox().await?;
        let ledger_removed = self.cleanup_ledger().await?;
        info!(outbox_removed, ledger_removed, "retention cleanup complete");
        Ok((outbox_removed, ledger_removed))
    }

    /// Deletes published outbox rows past retention.
    pub async fn cleanup_outbox(&self) -> Result<u64, ReplicationError> {
        self.outbox
            .cleanup_published(self.config.outbox_retention_days)
            .await
    }

    /// Deletes ledger entries past retention.
    pub async fn cleanup_ledger(&self) -> Result<u64, ReplicationError> {
        self.ledger.prune(self.config.ledger_retention_days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryBus, InMemoryDatabase};
    use crate::application::Publisher;
    use crate::config::PublisherConfig;
    use crate::domain::EventSource;
    use serde_json::json;

    fn janitor_for(db: &Arc<InMemoryDatabase>, config: JanitorConfig) -> Janitor {
        Janitor::new(db.clone(), db.clone(), config)
    }

    #[tokio::test]
    async fn run_once_reports_removed_counts() {
        let db = Arc::new(InMemoryDatabase::new("A"));
        let janitor = janitor_for(&db, JanitorConfig::default());

        let (outbox_removed, ledger_removed) = janitor.run_once().await.unwrap();
        assert_eq!(outbox_removed, 0);
        assert_eq!(ledger_removed, 0);
    }

    #[tokio::test]
    async fn cleanup_outbox_keeps_unpublished_rows() {
        let db = Arc::new(InMemoryDatabase::new("A"));
        db.insert("users", json!({"id": 1, "name": "John"})).unwrap();

        // Retention only ever touches published rows; this one has not
        // been drained yet.
        let config = JanitorConfig {
            outbox_retention_days: 1,
            ledger_retention_days: 1,
            ..JanitorConfig::default()
        };
        let janitor = janitor_for(&db, config);

        assert_eq!(janitor.cleanup_outbox().await.unwrap(), 0);
        assert_eq!(db.outbox_len(), 1);
    }

    #[tokio::test]
    async fn cleanup_outbox_keeps_rows_inside_retention() {
        let db = Arc::new(InMemoryDatabase::new("A"));
        let bus = Arc::new(InMemoryBus::new());
        db.insert("users", json!({"id": 1, "name": "John"})).unwrap();

        let publisher = Publisher::new(
            db.clone(),
            bus.clone(),
            EventSource::new("A", "primary"),
            PublisherConfig::default(),
        );
        publisher.drain_once().await.unwrap();

        let janitor = janitor_for(&db, JanitorConfig::default());
        // Published a moment ago: still inside the 7-day window.
        assert_eq!(janitor.cleanup_outbox().await.unwrap(), 0);
        assert_eq!(db.outbox_len(), 1);
    }
}
