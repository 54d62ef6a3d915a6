//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus
//! ```
//!
//! The same pipeline serves every aggregate; domain code stays pure and the
//! store and bus are injected.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use rentkit_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use rentkit_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale stream version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// Domain validation failure.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Not enough stock left for the requested quantity.
    #[error("insufficient stock for {product}: only {remaining} remain")]
    InsufficientStock { product: String, remaining: i64 },
    /// Domain invariant failure.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
    /// The command contradicts the aggregate's state (e.g. returning twice).
    #[error("conflict: {0}")]
    Conflict(String),
    /// The aggregate was never created.
    #[error("not found")]
    NotFound,
    /// Historical payloads could not be read back into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error(transparent)]
    Store(EventStoreError),
    /// Publication failed after a successful append.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InsufficientStock { product, remaining } => {
                DispatchError::InsufficientStock { product, remaining }
            }
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Events are persisted before they are published; if the append fails
/// nothing is published. A publication failure is reported after the events
/// are already stored.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the aggregate stream `aggregate_id`.
    ///
    /// `make_aggregate` builds the empty instance that history is replayed
    /// onto (e.g. `Rental::empty`). Returns the committed events, which is
    /// empty when the command was a no-op.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: rentkit_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }

    /// Rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(aggregate_id: AggregateId, stream: &[StoredEvent]) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use rentkit_core::{AggregateRoot, Money};
    use rentkit_events::InMemoryEventBus;
    use rentkit_products::{
        ChangeDailyPrice, CreateProduct, Product, ProductCommand, ProductId,
    };

    use crate::event_store::InMemoryEventStore;

    type Dispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn setup() -> Dispatcher {
        CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
    }

    fn create(dispatcher: &Dispatcher, product_id: ProductId) -> Result<Vec<StoredEvent>, DispatchError> {
        dispatcher.dispatch(
            product_id.0,
            "products.product",
            ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: "Chair".to_string(),
                image: None,
                daily_price: Money::from_cents(250),
                total_stock: 10,
                occurred_at: Utc::now(),
            }),
            |id| Product::empty(ProductId::new(id)),
        )
    }

    #[test]
    fn dispatch_persists_then_publishes() {
        let dispatcher = setup();
        let sub = dispatcher.bus().subscribe();
        let product_id = ProductId::new(AggregateId::new());

        let committed = create(&dispatcher, product_id).unwrap();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].event_type, "products.product.created");

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].aggregate_id(), product_id.0);
    }

    #[test]
    fn history_is_replayed_before_handling() {
        let dispatcher = setup();
        let product_id = ProductId::new(AggregateId::new());
        create(&dispatcher, product_id).unwrap();

        let err = create(&dispatcher, product_id).unwrap_err();
        assert!(matches!(err, DispatchError::Conflict(_)));

        dispatcher
            .dispatch(
                product_id.0,
                "products.product",
                ProductCommand::ChangeDailyPrice(ChangeDailyPrice {
                    product_id,
                    daily_price: Money::from_cents(300),
                    occurred_at: Utc::now(),
                }),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap();

        let product: Product = dispatcher
            .load(product_id.0, |id| Product::empty(ProductId::new(id)))
            .unwrap();
        assert_eq!(product.daily_price(), Money::from_cents(300));
        assert_eq!(product.version(), 2);
    }

    #[test]
    fn rejected_command_stores_nothing() {
        let dispatcher = setup();
        let sub = dispatcher.bus().subscribe();
        let product_id = ProductId::new(AggregateId::new());

        let err = dispatcher
            .dispatch(
                product_id.0,
                "products.product",
                ProductCommand::ChangeDailyPrice(ChangeDailyPrice {
                    product_id,
                    daily_price: Money::from_cents(300),
                    occurred_at: Utc::now(),
                }),
                |id| Product::empty(ProductId::new(id)),
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::NotFound));
        assert!(dispatcher.store().load_stream(product_id.0).unwrap().is_empty());
        assert!(sub.drain().is_empty());
    }

    #[test]
    fn domain_errors_keep_their_kind() {
        let err = DispatchError::from(DomainError::insufficient_stock("Chair", 2));
        assert_eq!(err.to_string(), "insufficient stock for Chair: only 2 remain");
        assert!(matches!(
            DispatchError::from(DomainError::validation("bad")),
            DispatchError::Validation(_)
        ));
    }
}
