use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentkit_bundles::{BundleEvent, BundleId, BundleLine};
use rentkit_events::EventEnvelope;

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors, replay_order};
use crate::read_model::ReadModelStore;

pub const BUNDLE_AGGREGATE_TYPE: &str = "bundles.bundle";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleReadModel {
    pub bundle_id: BundleId,
    pub name: String,
    pub description: String,
    pub lines: Vec<BundleLine>,
}

#[derive(Debug)]
pub struct BundleCatalogProjection<S>
where
    S: ReadModelStore<BundleId, BundleReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> BundleCatalogProjection<S>
where
    S: ReadModelStore<BundleId, BundleReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, bundle_id: &BundleId) -> Option<BundleReadModel> {
        self.store.get(bundle_id)
    }

    pub fn list(&self) -> Vec<BundleReadModel> {
        self.store.list()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != BUNDLE_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let ev: BundleEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: BUNDLE_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;

        let bundle_id = ev.bundle_id();
        if bundle_id.0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event bundle_id does not match envelope aggregate_id".to_string(),
            ));
        }

        let mut rm = self.store.get(&bundle_id).unwrap_or(BundleReadModel {
            bundle_id,
            name: String::new(),
            description: String::new(),
            lines: Vec::new(),
        });

        match ev {
            BundleEvent::BundleCreated(e) => {
                rm.name = e.name;
                rm.description = e.description;
                rm.lines.clear();
            }
            BundleEvent::BundleRenamed(e) => {
                rm.name = e.name;
                rm.description = e.description;
            }
            BundleEvent::BundleLineAdded(e) => {
                rm.lines.push(BundleLine {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                });
            }
            BundleEvent::BundleLineRemoved(e) => {
                rm.lines.retain(|l| l.line_no != e.line_no);
            }
        }

        self.store.upsert(bundle_id, rm);
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
    use rentkit_bundles::{BundleCreated, BundleLineAdded, BundleLineRemoved};
    use rentkit_core::AggregateId;
    use rentkit_events::Event;
    use rentkit_products::ProductId;
    use uuid::Uuid;

    use crate::read_model::InMemoryReadModelStore;

    fn envelope(seq: u64, ev: &BundleEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            ev.bundle_id().0,
            BUNDLE_AGGREGATE_TYPE,
            seq,
            ev.event_type(),
            serde_json::to_value(ev).unwrap(),
        )
    }

    #[test]
    fn lines_are_added_and_removed() {
        let projection = BundleCatalogProjection::new(InMemoryReadModelStore::new());
        let bundle_id = BundleId::new(AggregateId::new());
        let chair = ProductId::new(AggregateId::new());
        let table = ProductId::new(AggregateId::new());

        let events = [
            BundleEvent::BundleCreated(BundleCreated {
                bundle_id,
                name: "Garden party".to_string(),
                description: String::new(),
                occurred_at: Utc::now(),
            }),
            BundleEvent::BundleLineAdded(BundleLineAdded {
                bundle_id,
                line_no: 1,
                product_id: chair,
                quantity: 8,
                occurred_at: Utc::now(),
            }),
            BundleEvent::BundleLineAdded(BundleLineAdded {
                bundle_id,
                line_no: 2,
                product_id: table,
                quantity: 2,
                occurred_at: Utc::now(),
            }),
            BundleEvent::BundleLineRemoved(BundleLineRemoved {
                bundle_id,
                line_no: 1,
                occurred_at: Utc::now(),
            }),
        ];
        for (i, ev) in events.iter().enumerate() {
            projection.apply_envelope(&envelope(i as u64 + 1, ev)).unwrap();
        }

        let rm = projection.get(&bundle_id).unwrap();
        assert_eq!(rm.name, "Garden party");
        assert_eq!(
            rm.lines,
            vec![BundleLine { line_no: 2, product_id: table, quantity: 2 }]
        );
    }
}
