use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentkit_core::Money;
use rentkit_events::EventEnvelope;
use rentkit_products::{ProductEvent, ProductId};

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors, replay_order};
use crate::read_model::ReadModelStore;

pub const PRODUCT_AGGREGATE_TYPE: &str = "products.product";

/// Queryable product read model (catalog).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub daily_price: Money,
    pub total_stock: u32,
}

#[derive(Debug)]
pub struct ProductCatalogProjection<S>
where
    S: ReadModelStore<ProductId, ProductReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ProductCatalogProjection<S>
where
    S: ReadModelStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    pub fn list(&self) -> Vec<ProductReadModel> {
        self.store.list()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != PRODUCT_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let ev: ProductEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: PRODUCT_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;

        let product_id = ev.product_id();
        if product_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event product_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let blank = || ProductReadModel {
            product_id,
            name: String::new(),
            image: None,
            daily_price: Money::ZERO,
            total_stock: 0,
        };

        match ev {
            ProductEvent::ProductCreated(e) => {
                self.store.upsert(
                    e.product_id,
                    ProductReadModel {
                        product_id: e.product_id,
                        name: e.name,
                        image: e.image,
                        daily_price: e.daily_price,
                        total_stock: e.total_stock,
                    },
                );
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                let mut rm = self.store.get(&e.product_id).unwrap_or_else(blank);
                rm.name = e.name;
                rm.image = e.image;
                self.store.upsert(e.product_id, rm);
            }
            ProductEvent::DailyPriceChanged(e) => {
                let mut rm = self.store.get(&e.product_id).unwrap_or_else(blank);
                rm.daily_price = e.daily_price;
                self.store.upsert(e.product_id, rm);
            }
            ProductEvent::TotalStockSet(e) => {
                let mut rm = self.store.get(&e.product_id).unwrap_or_else(blank);
                rm.total_stock = e.total_stock;
                self.store.upsert(e.product_id, rm);
            }
        }

        self.cursors.advance(aggregate_id, seq);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        self.cursors.clear();
        for env in &replay_order(envelopes) {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rentkit_core::AggregateId;
    use rentkit_events::Event;
    use rentkit_products::{DailyPriceChanged, ProductCreated, TotalStockSet};
    use uuid::Uuid;

    use crate::read_model::InMemoryReadModelStore;

    fn envelope(seq: u64, ev: &ProductEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            ev.product_id().0,
            PRODUCT_AGGREGATE_TYPE,
            seq,
            ev.event_type(),
            serde_json::to_value(ev).unwrap(),
        )
    }

    fn created(product_id: ProductId) -> ProductEvent {
        ProductEvent::ProductCreated(ProductCreated {
            product_id,
            name: "Folding chair".to_string(),
            image: Some("chairs/folding.jpg".to_string()),
            daily_price: Money::from_cents(150),
            total_stock: 40,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn price_and_stock_changes_are_projected() {
        let projection = ProductCatalogProjection::new(InMemoryReadModelStore::new());
        let product_id = ProductId::new(AggregateId::new());

        projection.apply_envelope(&envelope(1, &created(product_id))).unwrap();
        projection
            .apply_envelope(&envelope(
                2,
                &ProductEvent::DailyPriceChanged(DailyPriceChanged {
                    product_id,
                    daily_price: Money::from_cents(175),
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();
        projection
            .apply_envelope(&envelope(
                3,
                &ProductEvent::TotalStockSet(TotalStockSet {
                    product_id,
                    total_stock: 35,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap();

        let rm = projection.get(&product_id).unwrap();
        assert_eq!(rm.daily_price, Money::from_cents(175));
        assert_eq!(rm.total_stock, 35);
        assert_eq!(rm.image.as_deref(), Some("chairs/folding.jpg"));
    }

    #[test]
    fn gap_in_sequence_is_an_error() {
        let projection = ProductCatalogProjection::new(InMemoryReadModelStore::new());
        let product_id = ProductId::new(AggregateId::new());
        projection.apply_envelope(&envelope(1, &created(product_id))).unwrap();

        let err = projection
            .apply_envelope(&envelope(
                3,
                &ProductEvent::TotalStockSet(TotalStockSet {
                    product_id,
                    total_stock: 1,
                    occurred_at: Utc::now(),
                }),
            ))
            .unwrap_err();
        assert!(matches!(err, ProjectionError::NonMonotonicSequence { last: 1, found: 3 }));
    }

    #[test]
    fn rebuild_replaces_existing_state() {
        let projection = ProductCatalogProjection::new(InMemoryReadModelStore::new());
        let stale = ProductId::new(AggregateId::new());
        projection.apply_envelope(&envelope(1, &created(stale))).unwrap();

        let fresh = ProductId::new(AggregateId::new());
        projection.rebuild_from_scratch(vec![envelope(1, &created(fresh))]).unwrap();

        assert!(projection.get(&stale).is_none());
        assert!(projection.get(&fresh).is_some());
    }
}
