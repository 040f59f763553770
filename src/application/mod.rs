//! Application services: the publisher and consumer loops, the janitor,
//! and shutdown plumbing.

mod consumer;
mod janitor;
mod publisher;
mod shutdown;

pub use consumer::{Consumer, ConsumerMetrics};
pub use janitor::Janitor;
pub use publisher::{Publisher, PublisherMetrics};
pub use shutdown::{wait_for_termination, ShutdownSignal};
