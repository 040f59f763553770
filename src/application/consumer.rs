//! Consumer - applies remote-origin changes to the local database.
//!
//! Per-message flow: poll → parse → own-origin check → apply (one local
//! transaction covering the ledger dedupe, the version-checked DML, and
//! the ledger insert) → acknowledge. The acknowledgement ordering is the
//! whole contract: a message is acked only after its transaction
//! committed, so a crash between the two leaves a ledger entry that
//! turns the redelivery into a no-op.
//!
//! Failure handling follows the error taxonomy: poison payloads are
//! acked and counted so they cannot stall the partition; transient
//! infrastructure errors and `error`-policy conflicts leave the message
//! unacknowledged for redelivery.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::domain::{ChangeEvent, ReplicationError};
use crate::ports::{ApplyOutcome, ChangeApplier, MessageConsumer};

/// Counter snapshot returned by [`Consumer::metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerMetrics {
    /// Events applied to the local database.
    pub processed: u64,
    /// Events dropped on purpose: own-origin, duplicate, or conflict-skipped.
    pub skipped: u64,
    /// Poison payloads and policy conflicts.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// Background service consuming remote change events.
pub struct Consumer {
    bus: Arc<dyn MessageConsumer>,
    applier: Arc<dyn ChangeApplier>,
    contour: String,
    config: ConsumerConfig,
    counters: Counters,
}

impl Consumer {
    /// Creates a consumer for one contour.
    pub fn new(
        bus: Arc<dyn MessageConsumer>,
        applier: Arc<dyn ChangeApplier>,
        contour: impl Into<String>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            bus,
            applier,
            contour: contour.into(),
            config,
            counters: Counters::default(),
        }
    }

    /// Runs the consume loop until the shutdown signal flips.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            contour = %self.contour,
            policy = %self.config.conflict_policy,
            "consumer started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        let metrics = self.metrics();
                        info!(
                            processed = metrics.processed,
                            skipped = metrics.skipped,
                            failed = metrics.failed,
                            "consumer stopped"
                        );
                        return;
                    }
                }

                result = self.process_one() => {
                    match result {
                        Ok(()) => {}
                        Err(err) if err.is_transient() => {
                            warn!(error = %err, "transient failure, backing off");
                            time::sleep(self.config.error_backoff()).await;
                        }
                        Err(err) => {
                            error!(error = %err, "message processing failed");
                        }
                    }
                }
            }
        }
    }

    /// Polls and processes at most one message.
    ///
    /// Returns `Ok(())` when the poll timed out, when a message was fully
    /// handled, and when a poison message was dropped. Errors mean the
    /// message stays unacknowledged on the bus.
    pub async fn process_one(&self) -> Result<(), ReplicationError> {
        let Some(message) = self.bus.poll(self.config.poll_timeout()).await? else {
            return Ok(());
        };

        let event = match ChangeEvent::from_bytes(&message.payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    payload = %String::from_utf8_lossy(&message.payload),
                    error = %err,
                    "dropping malformed event"
                );
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.bus.ack(&message).await?;
                return Ok(());
            }
        };

        // Own-origin events are dropped outright. The in-database
        // suppression predicate is the first line of defense; this check
        // shields against a misconfigured trigger on the other side.
        if event.source.contour == self.contour {
            debug!(event_id = %event.event_id, "skipping own-origin event");
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            self.bus.ack(&message).await?;
            return Ok(());
        }

        match self
            .applier
            .apply(&event, self.config.conflict_policy)
            .await
        {
            Ok(ApplyOutcome::Applied) => {
                debug!(
                    event_id = %event.event_id,
                    table = %event.table,
                    operation = %event.operation,
                    "applied remote change"
                );
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                self.bus.ack(&message).await?;
            }
            Ok(ApplyOutcome::Duplicate) => {
                debug!(event_id = %event.event_id, "duplicate event, ledger hit");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                self.bus.ack(&message).await?;
            }
            Ok(ApplyOutcome::ConflictSkipped) => {
                debug!(event_id = %event.event_id, "existing row won the conflict");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                self.bus.ack(&message).await?;
            }
            Err(err) if err.is_poison() => {
                warn!(event_id = %event.event_id, error = %err, "dropping unprocessable event");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.bus.ack(&message).await?;
            }
            Err(err @ ReplicationError::Conflict { .. }) => {
                // `error` policy: leave the message for redelivery until
                // an operator resolves the divergence.
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.bus.rewind(&message).await?;
                return Err(err);
            }
            Err(err) => {
                // Transient: the bus redelivers and the ledger makes the
                // retry idempotent.
                self.bus.rewind(&message).await?;
                return Err(err);
            }
        }

        Ok(())
    }

    /// Current counter snapshot.
    pub fn metrics(&self) -> ConsumerMetrics {
        ConsumerMetrics {
            processed: self.counters.processed.load(Ordering::Relaxed),
            skipped: self.counters.skipped.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}
