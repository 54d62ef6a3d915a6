//! Append-only event store boundary.
//!
//! One stream per aggregate instance, keyed by aggregate id. Sequence numbers
//! start at 1 and grow by one per event within a stream.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
