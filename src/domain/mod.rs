//! Core replication domain: the change event document, conflict
//! resolution, identifier hygiene, and the pipeline error taxonomy.

mod conflict;
mod error;
mod event;
mod ident;

pub use conflict::{resolve, ConflictDecision, ConflictPolicy};
pub use error::ReplicationError;
pub use event::{pk_text, topic_for_table, ChangeEvent, EventId, EventSource, Operation};
pub use ident::is_safe_identifier;
