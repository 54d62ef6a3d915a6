//! Rental desk: the application service every operation runs through.
//!
//! Writes go through the [`CommandDispatcher`]; committed events are applied
//! to the read models before the call returns and are also published on the
//! event bus. Checks that span aggregates (stock availability, references to
//! clients and products) read those read models.
//!
//! Every write holds the stock guard from its first check until its events
//! are projected, so two writers never both pass a stale availability check.
//! Queries that combine read models (availability, totals, receipts and
//! listings) take the guard as well and never see a half-applied write or a
//! rebuild in progress. Single lookups (`client`, `product`, `rental`,
//! `bundle`) skip it: each returns a whole row, but during a rebuild the row
//! may briefly be missing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use rentkit_bundles::{
    AddBundleLine, Bundle, BundleCommand, BundleEvent, BundleId, CreateBundle, RemoveBundleLine,
    RenameBundle, expand,
};
use rentkit_clients::{Client, ClientCommand, ClientId, ContactInfo, RegisterClient, UpdateClient};
use rentkit_core::{Aggregate, AggregateId, DomainError, Money};
use rentkit_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use rentkit_inventory::{StockStatus, available_stock, committed_quantity, ensure_available};
use rentkit_products::{
    ChangeDailyPrice, CreateProduct, Product, ProductCommand, ProductId, SetTotalStock,
    UpdateProductDetails,
};
use rentkit_rentals::{
    AddItem, ChangeItemQuantity, ItemRef, LineOutcome, MarkReturned, MergeItems, OpenRental,
    RemoveItem, ReopenRental, Rental, RentalCommand, RentalEvent, RentalId, Reschedule,
    SetInternalUse, final_quantities, plan_merge,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::DeskConfig;
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
use crate::listing::{
    BundleSummary, ProductAvailability, RentalFilter, RentalSummary, contains_ignore_case,
};
use crate::projections::{
    BUNDLE_AGGREGATE_TYPE, BundleCatalogProjection, BundleReadModel, CLIENT_AGGREGATE_TYPE,
    ClientDirectoryProjection, ClientReadModel, PRODUCT_AGGREGATE_TYPE, ProductCatalogProjection,
    ProductReadModel, ProjectionError, RENTAL_AGGREGATE_TYPE, RentalLedgerProjection,
    RentalReadModel,
};
use crate::read_model::InMemoryReadModelStore;
use crate::receipt::{RentalReceipt, rental_title};

#[derive(Debug, Error)]
pub enum DeskError {
    #[error("insufficient stock for {product}: only {remaining} remain")]
    InsufficientStock { product: String, remaining: i64 },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Dispatch(DispatchError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

impl From<DispatchError> for DeskError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::InsufficientStock { product, remaining } => {
                DeskError::InsufficientStock { product, remaining }
            }
            DispatchError::Validation(msg) => DeskError::Validation(msg),
            DispatchError::Conflict(msg) => DeskError::Conflict(msg),
            other => DeskError::Dispatch(other),
        }
    }
}

impl From<DomainError> for DeskError {
    fn from(value: DomainError) -> Self {
        DispatchError::from(value).into()
    }
}

pub type DeskResult<T> = Result<T, DeskError>;

fn not_found(kind: &'static str, id: impl core::fmt::Display) -> DeskError {
    DeskError::NotFound {
        kind,
        id: id.to_string(),
    }
}

/// Input for [`RentalDesk::create_product`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub image: Option<String>,
    pub daily_price: Money,
    pub total_stock: u32,
}

impl NewProduct {
    /// One unit in stock, no image.
    pub fn new(name: impl Into<String>, daily_price: Money) -> Self {
        Self {
            name: name.into(),
            image: None,
            daily_price,
            total_stock: 1,
        }
    }

    pub fn with_stock(mut self, total_stock: u32) -> Self {
        self.total_stock = total_stock;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Input for [`RentalDesk::open_rental`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRental {
    pub client_id: ClientId,
    /// Today when unset.
    pub rental_date: Option<NaiveDate>,
    pub expected_return_date: NaiveDate,
    pub internal_use: bool,
}

type JsonBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

pub struct RentalDesk {
    config: DeskConfig,
    dispatcher: CommandDispatcher<Arc<InMemoryEventStore>, Arc<JsonBus>>,
    clients: ClientDirectoryProjection<InMemoryReadModelStore<ClientId, ClientReadModel>>,
    products: ProductCatalogProjection<InMemoryReadModelStore<ProductId, ProductReadModel>>,
    rentals: RentalLedgerProjection<InMemoryReadModelStore<RentalId, RentalReadModel>>,
    bundles: BundleCatalogProjection<InMemoryReadModelStore<BundleId, BundleReadModel>>,
    stock_guard: Mutex<()>,
}

impl RentalDesk {
    pub fn new(config: DeskConfig) -> Self {
        Self::with_event_store(config, Arc::new(InMemoryEventStore::new()))
    }

    /// Desk over an existing event store; read models start empty until
    /// [`RentalDesk::rebuild_read_models`] runs.
    pub fn with_event_store(config: DeskConfig, store: Arc<InMemoryEventStore>) -> Self {
        Self {
            config,
            dispatcher: CommandDispatcher::new(store, Arc::new(InMemoryEventBus::new())),
            clients: ClientDirectoryProjection::new(InMemoryReadModelStore::new()),
            products: ProductCatalogProjection::new(InMemoryReadModelStore::new()),
            rentals: RentalLedgerProjection::new(InMemoryReadModelStore::new()),
            bundles: BundleCatalogProjection::new(InMemoryReadModelStore::new()),
            stock_guard: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &DeskConfig {
        &self.config
    }

    pub fn event_store(&self) -> &Arc<InMemoryEventStore> {
        self.dispatcher.store()
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable.
        self.stock_guard.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn execute<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> DeskResult<Vec<StoredEvent>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: rentkit_events::Event + Serialize + DeserializeOwned,
    {
        let committed = self
            .dispatcher
            .dispatch(aggregate_id, aggregate_type, command, make_aggregate)?;

        for stored in &committed {
            self.apply_to_read_models(&stored.to_envelope())?;
            debug!(
                event_type = %stored.event_type,
                aggregate_id = %stored.aggregate_id,
                sequence = stored.sequence_number,
                "projected event"
            );
        }
        Ok(committed)
    }

    fn apply_to_read_models(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        self.clients.apply_envelope(envelope)?;
        self.products.apply_envelope(envelope)?;
        self.rentals.apply_envelope(envelope)?;
        self.bundles.apply_envelope(envelope)?;
        Ok(())
    }

    fn check_stock(
        &self,
        product: &ProductReadModel,
        candidate: Option<ItemRef>,
        requested: u32,
    ) -> DeskResult<()> {
        let commitments = self.rentals.commitments();
        ensure_available(
            &product.name,
            product.total_stock,
            product.product_id,
            &commitments,
            candidate,
            requested,
        )
        .map_err(|err| {
            warn!(product = %product.name, requested, error = %err, "stock check rejected");
            DeskError::from(err)
        })
    }

    fn load_bundle(&self, bundle_id: BundleId) -> DeskResult<Bundle> {
        let bundle: Bundle = self
            .dispatcher
            .load(bundle_id.0, |id| Bundle::empty(BundleId::new(id)))?;
        if !bundle.is_created() {
            return Err(not_found("bundle", bundle_id));
        }
        Ok(bundle)
    }

    // Clients

    pub fn register_client(&self, name: impl Into<String>, contact: ContactInfo) -> DeskResult<ClientId> {
        let _guard = self.guard();
        let client_id = ClientId::new(AggregateId::new());

        self.execute(
            client_id.0,
            CLIENT_AGGREGATE_TYPE,
            ClientCommand::RegisterClient(RegisterClient {
                client_id,
                name: name.into(),
                contact,
                occurred_at: Utc::now(),
            }),
            |id| Client::empty(ClientId::new(id)),
        )?;

        info!(client_id = %client_id, "client registered");
        Ok(client_id)
    }

    pub fn update_client(
        &self,
        client_id: ClientId,
        name: Option<String>,
        contact: Option<ContactInfo>,
    ) -> DeskResult<()> {
        let _guard = self.guard();
        self.client(client_id)?;

        self.execute(
            client_id.0,
            CLIENT_AGGREGATE_TYPE,
            ClientCommand::UpdateClient(UpdateClient {
                client_id,
                name,
                contact,
                occurred_at: Utc::now(),
            }),
            |id| Client::empty(ClientId::new(id)),
        )?;

        info!(client_id = %client_id, "client updated");
        Ok(())
    }

    // Products

    pub fn create_product(&self, product: NewProduct) -> DeskResult<ProductId> {
        let _guard = self.guard();
        let product_id = ProductId::new(AggregateId::new());

        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::CreateProduct(CreateProduct {
                product_id,
                name: product.name,
                image: product.image,
                daily_price: product.daily_price,
                total_stock: product.total_stock,
                occurred_at: Utc::now(),
            }),
            |id| Product::empty(ProductId::new(id)),
        )?;

        info!(product_id = %product_id, total_stock = product.total_stock, "product created");
        Ok(product_id)
    }

    /// `image: Some(None)` removes the image.
    pub fn update_product_details(
        &self,
        product_id: ProductId,
        name: Option<String>,
        image: Option<Option<String>>,
    ) -> DeskResult<()> {
        let _guard = self.guard();
        self.product(product_id)?;

        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::UpdateProductDetails(UpdateProductDetails {
                product_id,
                name,
                image,
                occurred_at: Utc::now(),
            }),
            |id| Product::empty(ProductId::new(id)),
        )?;

        info!(product_id = %product_id, "product details updated");
        Ok(())
    }

    pub fn change_daily_price(&self, product_id: ProductId, daily_price: Money) -> DeskResult<()> {
        let _guard = self.guard();
        self.product(product_id)?;

        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::ChangeDailyPrice(ChangeDailyPrice {
                product_id,
                daily_price,
                occurred_at: Utc::now(),
            }),
            |id| Product::empty(ProductId::new(id)),
        )?;

        info!(product_id = %product_id, daily_price = %daily_price, "daily price changed");
        Ok(())
    }

    /// Refuses to go below the units currently out on rental.
    pub fn set_total_stock(&self, product_id: ProductId, total_stock: u32) -> DeskResult<()> {
        let _guard = self.guard();
        let product = self.product(product_id)?;

        let committed = committed_quantity(product_id, &self.rentals.commitments(), None);
        if i64::from(total_stock) < committed {
            warn!(product = %product.name, total_stock, committed, "stock change rejected");
            return Err(DeskError::Validation(format!(
                "cannot set stock of {} to {total_stock}: {committed} units are out on rental",
                product.name
            )));
        }

        self.execute(
            product_id.0,
            PRODUCT_AGGREGATE_TYPE,
            ProductCommand::SetTotalStock(SetTotalStock {
                product_id,
                total_stock,
                occurred_at: Utc::now(),
            }),
            |id| Product::empty(ProductId::new(id)),
        )?;

        info!(product_id = %product_id, total_stock, "total stock set");
        Ok(())
    }

    // Bundles

    pub fn create_bundle(&self, name: impl Into<String>, description: impl Into<String>) -> DeskResult<BundleId> {
        let _guard = self.guard();
        let bundle_id = BundleId::new(AggregateId::new());

        self.execute(
            bundle_id.0,
            BUNDLE_AGGREGATE_TYPE,
            BundleCommand::CreateBundle(CreateBundle {
                bundle_id,
                name: name.into(),
                description: description.into(),
                occurred_at: Utc::now(),
            }),
            |id| Bundle::empty(BundleId::new(id)),
        )?;

        info!(bundle_id = %bundle_id, "bundle created");
        Ok(bundle_id)
    }

    pub fn rename_bundle(
        &self,
        bundle_id: BundleId,
        name: Option<String>,
        description: Option<String>,
    ) -> DeskResult<()> {
        let _guard = self.guard();
        self.bundle(bundle_id)?;

        self.execute(
            bundle_id.0,
            BUNDLE_AGGREGATE_TYPE,
            BundleCommand::RenameBundle(RenameBundle {
                bundle_id,
                name,
                description,
                occurred_at: Utc::now(),
            }),
            |id| Bundle::empty(BundleId::new(id)),
        )?;

        info!(bundle_id = %bundle_id, "bundle renamed");
        Ok(())
    }

    /// Returns the new line's number.
    pub fn add_bundle_line(&self, bundle_id: BundleId, product_id: ProductId, quantity: u32) -> DeskResult<u32> {
        let _guard = self.guard();
        self.bundle(bundle_id)?;
        self.product(product_id)?;

        let committed = self.execute(
            bundle_id.0,
            BUNDLE_AGGREGATE_TYPE,
            BundleCommand::AddBundleLine(AddBundleLine {
                bundle_id,
                product_id,
                quantity,
                occurred_at: Utc::now(),
            }),
            |id| Bundle::empty(BundleId::new(id)),
        )?;

        let line_no = committed
            .iter()
            .find_map(|stored| match decode::<BundleEvent>(stored) {
                Ok(BundleEvent::BundleLineAdded(e)) => Some(e.line_no),
                _ => None,
            })
            .ok_or_else(|| DeskError::Dispatch(DispatchError::InvariantViolation(
                "bundle line was not added".to_string(),
            )))?;

        info!(bundle_id = %bundle_id, line_no, product_id = %product_id, quantity, "bundle line added");
        Ok(line_no)
    }

    pub fn remove_bundle_line(&self, bundle_id: BundleId, line_no: u32) -> DeskResult<()> {
        let _guard = self.guard();
        let bundle = self.bundle(bundle_id)?;
        if !bundle.lines.iter().any(|l| l.line_no == line_no) {
            return Err(not_found("bundle line", format!("{bundle_id}#{line_no}")));
        }

        self.execute(
            bundle_id.0,
            BUNDLE_AGGREGATE_TYPE,
            BundleCommand::RemoveBundleLine(RemoveBundleLine {
                bundle_id,
                line_no,
                occurred_at: Utc::now(),
            }),
            |id| Bundle::empty(BundleId::new(id)),
        )?;

        info!(bundle_id = %bundle_id, line_no, "bundle line removed");
        Ok(())
    }

    // Rentals

    pub fn open_rental(&self, rental: NewRental) -> DeskResult<RentalId> {
        let _guard = self.guard();
        self.client(rental.client_id)?;
        let rental_id = RentalId::new(AggregateId::new());
        let rental_date = rental.rental_date.unwrap_or_else(|| Utc::now().date_naive());

        self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::OpenRental(OpenRental {
                rental_id,
                client_id: rental.client_id,
                rental_date,
                expected_return_date: rental.expected_return_date,
                internal_use: rental.internal_use,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %rental_id, client_id = %rental.client_id, "rental opened");
        Ok(rental_id)
    }

    /// Add a new item line, checked against stock unless the rental is
    /// returned.
    pub fn add_item(&self, rental_id: RentalId, product_id: ProductId, quantity: u32) -> DeskResult<ItemRef> {
        let _guard = self.guard();
        let rental = self.rental(rental_id)?;
        let product = self.product(product_id)?;

        if !rental.returned {
            self.check_stock(&product, None, quantity)?;
        }

        let committed = self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::AddItem(AddItem {
                rental_id,
                product_id,
                quantity,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        let line_no = committed
            .iter()
            .find_map(|stored| match decode::<RentalEvent>(stored) {
                Ok(RentalEvent::ItemAdded(e)) => Some(e.line_no),
                _ => None,
            })
            .ok_or_else(|| DeskError::Dispatch(DispatchError::InvariantViolation(
                "rental item was not added".to_string(),
            )))?;

        info!(rental_id = %rental_id, line_no, product = %product.name, quantity, "rental item added");
        Ok(ItemRef { rental_id, line_no })
    }

    pub fn change_item_quantity(&self, item: ItemRef, quantity: u32) -> DeskResult<()> {
        let _guard = self.guard();
        let rental = self.rental(item.rental_id)?;
        let current = rental
            .item(item.line_no)
            .ok_or_else(|| not_found("rental item", format!("{}#{}", item.rental_id, item.line_no)))?;
        let product = self.product(current.product_id)?;

        if !rental.returned {
            self.check_stock(&product, Some(item), quantity)?;
        }

        self.execute(
            item.rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::ChangeItemQuantity(ChangeItemQuantity {
                rental_id: item.rental_id,
                line_no: item.line_no,
                quantity,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %item.rental_id, line_no = item.line_no, quantity, "rental item quantity changed");
        Ok(())
    }

    pub fn remove_item(&self, item: ItemRef) -> DeskResult<()> {
        let _guard = self.guard();
        let rental = self.rental(item.rental_id)?;
        if rental.item(item.line_no).is_none() {
            return Err(not_found("rental item", format!("{}#{}", item.rental_id, item.line_no)));
        }

        self.execute(
            item.rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::RemoveItem(RemoveItem {
                rental_id: item.rental_id,
                line_no: item.line_no,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %item.rental_id, line_no = item.line_no, "rental item removed");
        Ok(())
    }

    pub fn reschedule(
        &self,
        rental_id: RentalId,
        rental_date: NaiveDate,
        expected_return_date: NaiveDate,
    ) -> DeskResult<()> {
        let _guard = self.guard();
        self.rental(rental_id)?;

        self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::Reschedule(Reschedule {
                rental_id,
                rental_date,
                expected_return_date,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %rental_id, %rental_date, %expected_return_date, "rental rescheduled");
        Ok(())
    }

    pub fn set_internal_use(&self, rental_id: RentalId, internal_use: bool) -> DeskResult<()> {
        let _guard = self.guard();
        self.rental(rental_id)?;

        self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::SetInternalUse(SetInternalUse {
                rental_id,
                internal_use,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %rental_id, internal_use, "rental internal use changed");
        Ok(())
    }

    /// The rental's items stop holding stock.
    pub fn mark_returned(&self, rental_id: RentalId) -> DeskResult<()> {
        let _guard = self.guard();
        self.rental(rental_id)?;

        self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::MarkReturned(MarkReturned {
                rental_id,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %rental_id, "rental returned");
        Ok(())
    }

    /// Undo a return. Every item must fit in the stock that is left.
    pub fn reopen(&self, rental_id: RentalId) -> DeskResult<()> {
        let _guard = self.guard();
        let rental = self.rental(rental_id)?;

        if rental.returned {
            // Items of this rental are not committed while it is returned, so
            // each product's combined quantity is checked against the rest.
            let mut per_product: Vec<(ProductId, u32)> = Vec::new();
            for item in &rental.items {
                match per_product.iter_mut().find(|(p, _)| *p == item.product_id) {
                    Some((_, qty)) => *qty = qty.saturating_add(item.quantity),
                    None => per_product.push((item.product_id, item.quantity)),
                }
            }
            for (product_id, quantity) in per_product {
                let product = self.product(product_id)?;
                self.check_stock(&product, None, quantity)?;
            }
        }

        self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::ReopenRental(ReopenRental {
                rental_id,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(rental_id = %rental_id, "rental reopened");
        Ok(())
    }

    /// Merge the lines of `bundle_ids` into the rental, in order.
    ///
    /// With `enforce_bundle_stock`, the resulting quantity of every touched
    /// item is checked first and nothing is written if any check fails.
    /// Returns where each touched item ended up.
    pub fn apply_bundles(&self, rental_id: RentalId, bundle_ids: &[BundleId]) -> DeskResult<Vec<LineOutcome>> {
        let _guard = self.guard();
        let rental = self.rental(rental_id)?;
        let bundles = bundle_ids
            .iter()
            .map(|id| self.load_bundle(*id))
            .collect::<DeskResult<Vec<_>>>()?;

        let requests = expand(&bundles);
        let outcomes = final_quantities(&plan_merge(&rental.items, rental.next_line_no, &requests));
        if outcomes.is_empty() {
            return Ok(outcomes);
        }

        if !rental.returned && self.config.enforce_bundle_stock {
            for outcome in &outcomes {
                let product = self.product(outcome.product_id)?;
                let candidate = (!outcome.created).then_some(ItemRef {
                    rental_id,
                    line_no: outcome.line_no,
                });
                self.check_stock(&product, candidate, outcome.quantity)?;
            }
        }

        self.execute(
            rental_id.0,
            RENTAL_AGGREGATE_TYPE,
            RentalCommand::MergeItems(MergeItems {
                rental_id,
                requests,
                occurred_at: Utc::now(),
            }),
            |id| Rental::empty(RentalId::new(id)),
        )?;

        info!(
            rental_id = %rental_id,
            bundles = bundle_ids.len(),
            lines = outcomes.len(),
            "bundles applied"
        );
        Ok(outcomes)
    }

    // Queries

    pub fn client(&self, client_id: ClientId) -> DeskResult<ClientReadModel> {
        self.clients.get(&client_id).ok_or_else(|| not_found("client", client_id))
    }

    pub fn product(&self, product_id: ProductId) -> DeskResult<ProductReadModel> {
        self.products.get(&product_id).ok_or_else(|| not_found("product", product_id))
    }

    pub fn rental(&self, rental_id: RentalId) -> DeskResult<RentalReadModel> {
        self.rentals.get(&rental_id).ok_or_else(|| not_found("rental", rental_id))
    }

    pub fn bundle(&self, bundle_id: BundleId) -> DeskResult<BundleReadModel> {
        self.bundles.get(&bundle_id).ok_or_else(|| not_found("bundle", bundle_id))
    }

    /// Total stock minus units on rentals that are not returned.
    pub fn available_stock(&self, product_id: ProductId) -> DeskResult<i64> {
        let _guard = self.guard();
        let product = self.product(product_id)?;
        Ok(available_stock(
            product.total_stock,
            product_id,
            &self.rentals.commitments(),
            None,
        ))
    }

    pub fn product_availability(&self, product_id: ProductId) -> DeskResult<ProductAvailability> {
        let _guard = self.guard();
        let product = self.product(product_id)?;
        Ok(self.availability_of(product, &self.rentals.commitments()))
    }

    fn availability_of(
        &self,
        product: ProductReadModel,
        commitments: &[rentkit_inventory::Commitment],
    ) -> ProductAvailability {
        let committed = committed_quantity(product.product_id, commitments, None);
        let available = i64::from(product.total_stock) - committed;
        ProductAvailability {
            product_id: product.product_id,
            status: StockStatus::classify(available, self.config.low_stock_threshold),
            name: product.name,
            daily_price: product.daily_price,
            total_stock: product.total_stock,
            committed,
            available,
        }
    }

    /// Products whose name contains `search` (case-insensitive), by name.
    pub fn list_products(&self, search: Option<&str>) -> Vec<ProductAvailability> {
        let _guard = self.guard();
        let commitments = self.rentals.commitments();
        let mut rows: Vec<ProductAvailability> = self
            .products
            .list()
            .into_iter()
            .filter(|p| search.is_none_or(|s| contains_ignore_case(&p.name, s)))
            .map(|p| self.availability_of(p, &commitments))
            .collect();
        rows.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.product_id.0.cmp(&b.product_id.0))
        });
        rows
    }

    pub fn rental_total(&self, rental_id: RentalId) -> DeskResult<Money> {
        let _guard = self.guard();
        let rental = self.rental(rental_id)?;
        Ok(rental
            .quote(|p| self.products.get(&p).map(|rm| rm.daily_price))?
            .total)
    }

    pub fn receipt(&self, rental_id: RentalId) -> DeskResult<RentalReceipt> {
        let _guard = self.guard();
        let rental = self.rental(rental_id)?;
        let client = self.client(rental.client_id)?;
        RentalReceipt::build(&rental, &client, |p| self.products.get(&p)).map_err(DeskError::from)
    }

    /// Newest rental date first.
    pub fn list_rentals(&self, filter: &RentalFilter) -> Vec<RentalSummary> {
        let _guard = self.guard();
        let client_names: HashMap<ClientId, String> = self
            .clients
            .list()
            .into_iter()
            .map(|c| (c.client_id, c.name))
            .collect();

        let mut rows: Vec<RentalSummary> = self
            .rentals
            .list()
            .into_iter()
            .filter_map(|rental| {
                let client_name = client_names.get(&rental.client_id).cloned().unwrap_or_default();
                if !filter.matches(&rental, &client_name) {
                    return None;
                }
                let total = match rental.quote(|p| self.products.get(&p).map(|rm| rm.daily_price)) {
                    Ok(quote) => Some(quote.total),
                    Err(err) => {
                        warn!(rental_id = %rental.rental_id, error = %err, "rental total unavailable");
                        None
                    }
                };
                Some(RentalSummary {
                    rental_id: rental.rental_id,
                    title: rental_title(rental.rental_id, &client_name, rental.internal_use),
                    client_name,
                    rental_date: rental.rental_date,
                    expected_return_date: rental.expected_return_date,
                    returned: rental.returned,
                    internal_use: rental.internal_use,
                    item_count: rental.items.len(),
                    total,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.rental_date
                .cmp(&a.rental_date)
                .then_with(|| a.rental_id.0.cmp(&b.rental_id.0))
        });
        rows
    }

    pub fn list_bundles(&self) -> Vec<BundleSummary> {
        let mut rows: Vec<BundleSummary> = self
            .bundles
            .list()
            .into_iter()
            .map(|b| BundleSummary {
                bundle_id: b.bundle_id,
                line_count: b.lines.len(),
                name: b.name,
                description: b.description,
            })
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.bundle_id.0.cmp(&b.bundle_id.0)));
        rows
    }

    /// Drop every read model and replay the event store into it. Returns the
    /// number of events replayed.
    pub fn rebuild_read_models(&self) -> DeskResult<usize> {
        let _guard = self.guard();
        let envelopes: Vec<EventEnvelope<JsonValue>> = self
            .event_store()
            .load_all()?
            .iter()
            .map(StoredEvent::to_envelope)
            .collect();

        self.clients.rebuild_from_scratch(envelopes.clone())?;
        self.products.rebuild_from_scratch(envelopes.clone())?;
        self.rentals.rebuild_from_scratch(envelopes.clone())?;
        self.bundles.rebuild_from_scratch(envelopes.clone())?;

        info!(events = envelopes.len(), "read models rebuilt");
        Ok(envelopes.len())
    }
}

impl Default for RentalDesk {
    fn default() -> Self {
        Self::new(DeskConfig::default())
    }
}

fn decode<E: DeserializeOwned>(stored: &StoredEvent) -> Result<E, DispatchError> {
    serde_json::from_value(stored.payload.clone()).map_err(|e| DispatchError::Deserialize(e.to_string()))
}
