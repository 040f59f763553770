//! Contour Sync - bidirectional row-level database replication.
//!
//! Each geographically isolated deployment ("contour") runs a full
//! read-write database copy; this crate replicates row changes between
//! them over a shared message bus. Capture is trigger-driven into an
//! outbox, the publisher drains the outbox onto topic-partitioned
//! queues, and the consumer applies remote changes idempotently with
//! last-writer-wins convergence.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
