//! Rental ledger: every rental with its items, and the stock commitments
//! those items make.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentkit_clients::ClientId;
use rentkit_core::{DomainResult, Money};
use rentkit_events::EventEnvelope;
use rentkit_inventory::Commitment;
use rentkit_products::ProductId;
use rentkit_rentals::{ItemRef, Quote, RentalEvent, RentalId, RentalItem, duration_days, quote};

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors, replay_order};
use crate::read_model::ReadModelStore;

pub const RENTAL_AGGREGATE_TYPE: &str = "rentals.rental";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalReadModel {
    pub rental_id: RentalId,
    pub client_id: ClientId,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub returned: bool,
    pub internal_use: bool,
    pub items: Vec<RentalItem>,
    pub next_line_no: u32,
}

impl RentalReadModel {
    pub fn item(&self, line_no: u32) -> Option<&RentalItem> {
        self.items.iter().find(|i| i.line_no == line_no)
    }

    pub fn duration_days(&self) -> i64 {
        duration_days(self.rental_date, self.expected_return_date)
    }

    pub fn quote(&self, price_of: impl Fn(ProductId) -> Option<Money>) -> DomainResult<Quote> {
        quote(
            self.rental_date,
            self.expected_return_date,
            self.internal_use,
            &self.items,
            price_of,
        )
    }

    /// This rental's claims on stock.
    pub fn commitments(&self) -> impl Iterator<Item = Commitment> + '_ {
        self.items.iter().map(|i| Commitment {
            item: ItemRef {
                rental_id: self.rental_id,
                line_no: i.line_no,
            },
            product_id: i.product_id,
            quantity: i.quantity,
            rental_returned: self.returned,
        })
    }
}

#[derive(Debug)]
pub struct RentalLedgerProjection<S>
where
    S: ReadModelStore<RentalId, RentalReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> RentalLedgerProjection<S>
where
    S: ReadModelStore<RentalId, RentalReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, rental_id: &RentalId) -> Option<RentalReadModel> {
        self.store.get(rental_id)
    }

    pub fn list(&self) -> Vec<RentalReadModel> {
        self.store.list()
    }

    /// Every item of every rental as a stock commitment, returned or not.
    pub fn commitments(&self) -> Vec<Commitment> {
        self.store
            .list()
            .iter()
            .flat_map(|r| r.commitments().collect::<Vec<_>>())
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != RENTAL_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let ev: RentalEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: RENTAL_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;

        let rental_id = ev.rental_id();
        if rental_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event rental_id does not match envelope aggregate_id".to_string(),
            ));
        }

        if let RentalEvent::RentalOpened(e) = &ev {
            self.store.upsert(
                rental_id,
                RentalReadModel {
                    rental_id,
                    client_id: e.client_id,
                    rental_date: e.rental_date,
                    expected_return_date: e.expected_return_date,
                    returned: false,
                    internal_use: e.internal_use,
                    items: Vec::new(),
                    next_line_no: 1,
                },
            );
            self.cursors.advance(aggregate_id, seq);
            return Ok(());
        }

        let mut rm = self.store.get(&rental_id).ok_or_else(|| {
            ProjectionError::StreamMismatch(format!("event {seq} for unopened rental {rental_id}"))
        })?;

        match ev {
            RentalEvent::RentalOpened(_) => {}
            RentalEvent::ItemAdded(e) => {
                rm.items.push(RentalItem {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                });
                rm.next_line_no = rm.next_line_no.max(e.line_no + 1);
            }
            RentalEvent::ItemQuantityChanged(e) => {
                if let Some(item) = rm.items.iter_mut().find(|i| i.line_no == e.line_no) {
                    item.quantity = e.quantity;
                }
            }
            RentalEvent::ItemRemoved(e) => {
                rm.items.retain(|i| i.line_no != e.line_no);
            }
            RentalEvent::RentalRescheduled(e) => {
                rm.rental_date = e.rental_date;
                rm.expected_return_date = e.expected_return_date;
            }
            RentalEvent::InternalUseChanged(e) => {
                rm.internal_use = e.internal_use;
            }
            RentalEvent::RentalReturned(_) => {
                rm.returned = true;
            }
            RentalEvent::RentalReopened(_) => {
                rm.returned = false;
            }
        }

        self.store.upsert(rental_id, rm);
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
