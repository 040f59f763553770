//! Publisher - drains the capture outbox onto the bus.
//!
//! One drain iteration is one outbox transaction: lease a batch of
//! unpublished rows (skip-locked, ascending id), publish each as a bus
//! message keyed by the row's primary key, mark the batch published, and
//! commit. Infrastructure failures abort the whole batch; the rows come
//! back on the next iteration, so delivery is at-least-once and the
//! consumer's ledger absorbs the duplicates. A row whose payload cannot
//! become an event is poison, not transient: it is dropped from the
//! queue (logged and counted as failed) rather than retried, because the
//! ascending-id lease would otherwise re-select it forever and stall
//! every row behind it.
//!
//! ## Graceful Shutdown
//!
//! The service listens for a shutdown signal and drains one final batch
//! before stopping, so captured rows are not stranded until restart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::PublisherConfig;
use crate::domain::{EventSource, ReplicationError};
use crate::ports::{MessageProducer, OutboxStore};

/// Counter snapshot returned by [`Publisher::metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherMetrics {
    /// Outbox rows published and committed.
    pub processed: u64,
    /// Batches that failed and were rolled back.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    failed: AtomicU64,
}

/// Background service publishing captured changes from the outbox.
pub struct Publisher {
    outbox: Arc<dyn OutboxStore>,
    producer: Arc<dyn MessageProducer>,
    source: EventSource,
    config: PublisherConfig,
    counters: Counters,
}

impl Publisher {
    /// Creates a publisher for one contour.
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        producer: Arc<dyn MessageProducer>,
        source: EventSource,
        config: PublisherConfig,
    ) -> Self {
        Self {
            outbox,
            producer,
            source,
            config,
            counters: Counters::default(),
        }
    }

    /// Runs the drain loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval());
        info!(
            contour = %self.source.contour,
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval_ms,
            "publisher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        if let Err(err) = self.drain_once().await {
                            warn!(error = %err, "final drain failed during shutdown");
                        }
                        let metrics = self.metrics();
                        info!(
                            processed = metrics.processed,
                            failed = metrics.failed,
                            "publisher stopped"
                        );
                        return;
                    }
                }

                _ = interval.tick() => {
                    match self.drain_once().await {
                        Ok(0) => {}
                        Ok(count) => debug!(count, "published outbox batch"),
                        Err(err) => {
                            error!(error = %err, "outbox drain failed");
                            time::sleep(self.config.error_backoff()).await;
                        }
                    }
                }
            }
        }
    }

    /// One drain iteration; returns the number of rows published.
    pub async fn drain_once(&self) -> Result<usize, ReplicationError> {
        let lease = self.outbox.begin_drain(self.config.batch_size).await?;
        if lease.entries().is_empty() {
            lease.abort().await?;
            return Ok(0);
        }

        let entries = lease.entries().to_vec();
        let mut published = 0;
        for entry in entries {
            let outbox_id = entry.id;
            let event = match entry.into_change_event(&self.source) {
                Ok(event) => event,
                // Retrying cannot fix a malformed row, and aborting
                // would park it at the head of every future batch. The
                // commit below retires it as published without a bus
                // message; the row stays queryable in the outbox until
                // the janitor reaps it.
                Err(err) if err.is_poison() => {
                    error!(outbox_id, error = %err, "dropping unpublishable outbox row");
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                Err(err) => {
                    error!(outbox_id, error = %err, "outbox row cannot be published");
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    lease.abort().await?;
                    return Err(err);
                }
            };

            let topic = event.topic();
            let key = event.key()?;
            let payload = event.to_bytes()?;

            if let Err(err) = self.producer.publish(&topic, &key, &payload).await {
                warn!(
                    outbox_id,
                    topic = %topic,
                    key = %key,
                    error = %err,
                    "publish failed, releasing batch"
                );
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                lease.abort().await?;
                return Err(err);
            }
            published += 1;
        }

        lease.commit().await?;
        self.counters
            .processed
            .fetch_add(published as u64, Ordering::Relaxed);
        Ok(published)
    }

    /// Current counter snapshot.
    pub fn metrics(&self) -> PublisherMetrics {
        PublisherMetrics {
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
