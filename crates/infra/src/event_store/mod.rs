//! Append-only event store boundary.
//!
//! Streams are keyed by `(store_id, aggregate_type, aggregate_id)`, so a
//! product's catalog stream and its stock ledger share one aggregate id.

pub mod in_memory;
pub mod json_file;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use json_file::{JsonFileEventStore, LOG_FORMAT};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
