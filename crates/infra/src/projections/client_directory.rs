use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rentkit_clients::{ClientEvent, ClientId};
use rentkit_events::EventEnvelope;

use crate::projections::cursor::{CursorCheck, ProjectionError, StreamCursors, replay_order};
use crate::read_model::ReadModelStore;

pub const CLIENT_AGGREGATE_TYPE: &str = "clients.client";

/// Queryable client read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientReadModel {
    pub client_id: ClientId,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
}

/// Client directory projection.
#[derive(Debug)]
pub struct ClientDirectoryProjection<S>
where
    S: ReadModelStore<ClientId, ClientReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ClientDirectoryProjection<S>
where
    S: ReadModelStore<ClientId, ClientReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, client_id: &ClientId) -> Option<ClientReadModel> {
        self.store.get(client_id)
    }

    pub fn list(&self) -> Vec<ClientReadModel> {
        self.store.list()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != CLIENT_AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        if self.cursors.check(aggregate_id, seq)? == CursorCheck::Duplicate {
            return Ok(());
        }

        let ev: ClientEvent = serde_json::from_value(envelope.payload().clone()).map_err(|e| {
            ProjectionError::Deserialize {
                aggregate_type: CLIENT_AGGREGATE_TYPE,
                message: e.to_string(),
            }
        })?;

        if ev.client_id().0 != aggregate_id {
            return Err(ProjectionError::StreamMismatch(
                "event client_id does not match envelope aggregate_id".to_string(),
            ));
        }

        match ev {
            ClientEvent::ClientRegistered(e) => {
                self.store.upsert(
                    e.client_id,
                    ClientReadModel {
                        client_id: e.client_id,
                        name: e.name,
                        email: e.contact.email,
                        phone: e.contact.phone,
                    },
                );
            }
            ClientEvent::ClientUpdated(e) => {
                self.store.upsert(
                    e.client_id,
                    ClientReadModel {
                        client_id: e.client_id,
                        name: e.name,
                        email: e.contact.email,
                        phone: e.contact.phone,
                    },
                );
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
