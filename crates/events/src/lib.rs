//! Domain events and their distribution.
//!
//! Events are facts emitted by aggregates; envelopes carry them with stream
//! metadata; the bus fans committed envelopes out to subscribers.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
