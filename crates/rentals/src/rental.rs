use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use rentkit_clients::ClientId;
use rentkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use rentkit_events::Event;
use rentkit_products::ProductId;

use crate::merge::{ItemRequest, MergeStep, plan_merge};
use crate::pricing;

/// Rental identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RentalId(pub AggregateId);

impl RentalId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RentalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Identity of one rental item across all rentals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub rental_id: RentalId,
    pub line_no: u32,
}

/// Rental item: a product and how many units of it are booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Aggregate root: Rental.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rental {
    id: RentalId,
    client_id: Option<ClientId>,
    rental_date: NaiveDate,
    expected_return_date: NaiveDate,
    returned: bool,
    internal_use: bool,
    items: Vec<RentalItem>,
    next_line_no: u32,
    version: u64,
    created: bool,
}

impl Rental {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: RentalId) -> Self {
        Self {
            id,
            client_id: None,
            rental_date: NaiveDate::default(),
            expected_return_date: NaiveDate::default(),
            returned: false,
            internal_use: false,
            items: Vec::new(),
            next_line_no: 1,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> RentalId {
        self.id
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    pub fn rental_date(&self) -> NaiveDate {
        self.rental_date
    }

    pub fn expected_return_date(&self) -> NaiveDate {
        self.expected_return_date
    }

    pub fn is_returned(&self) -> bool {
        self.returned
    }

    pub fn is_internal_use(&self) -> bool {
        self.internal_use
    }

    pub fn items(&self) -> &[RentalItem] {
        &self.items
    }

    pub fn item(&self, line_no: u32) -> Option<&RentalItem> {
        self.items.iter().find(|i| i.line_no == line_no)
    }

    /// Line number the next new item will get.
    pub fn next_line_no(&self) -> u32 {
        self.next_line_no
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Days billed, never less than one.
    pub fn duration_days(&self) -> i64 {
        pricing::duration_days(self.rental_date, self.expected_return_date)
    }

    /// Plan where `requests` would land on this rental (merge-by-product).
    pub fn plan_merge(&self, requests: &[ItemRequest]) -> Vec<MergeStep> {
        plan_merge(&self.items, self.next_line_no, requests)
    }
}

impl AggregateRoot for Rental {
    type Id = RentalId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenRental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRental {
    pub rental_id: RentalId,
    pub client_id: ClientId,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub internal_use: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddItem (always a new line, even for a product already on the rental).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItem {
    pub rental_id: RentalId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeItemQuantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItemQuantity {
    pub rental_id: RentalId,
    pub line_no: u32,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveItem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveItem {
    pub rental_id: RentalId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MergeItems (bundle expansion).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeItems {
    pub rental_id: RentalId,
    pub requests: Vec<ItemRequest>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Reschedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reschedule {
    pub rental_id: RentalId,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetInternalUse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetInternalUse {
    pub rental_id: RentalId,
    pub internal_use: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReturned {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReopenRental (undo a return).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReopenRental {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalCommand {
    OpenRental(OpenRental),
    AddItem(AddItem),
    ChangeItemQuantity(ChangeItemQuantity),
    RemoveItem(RemoveItem),
    MergeItems(MergeItems),
    Reschedule(Reschedule),
    SetInternalUse(SetInternalUse),
    MarkReturned(MarkReturned),
    ReopenRental(ReopenRental),
}

/// Event: RentalOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalOpened {
    pub rental_id: RentalId,
    pub client_id: ClientId,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub internal_use: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAdded {
    pub rental_id: RentalId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemQuantityChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuantityChanged {
    pub rental_id: RentalId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub previous_quantity: u32,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRemoved {
    pub rental_id: RentalId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalRescheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalRescheduled {
    pub rental_id: RentalId,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InternalUseChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalUseChanged {
    pub rental_id: RentalId,
    pub internal_use: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalReturned {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RentalReopened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalReopened {
    pub rental_id: RentalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RentalEvent {
    RentalOpened(RentalOpened),
    ItemAdded(ItemAdded),
    ItemQuantityChanged(ItemQuantityChanged),
    ItemRemoved(ItemRemoved),
    RentalRescheduled(RentalRescheduled),
    InternalUseChanged(InternalUseChanged),
    RentalReturned(RentalReturned),
    RentalReopened(RentalReopened),
}

impl RentalEvent {
    pub fn rental_id(&self) -> RentalId {
        match self {
            RentalEvent::RentalOpened(e) => e.rental_id,
            RentalEvent::ItemAdded(e) => e.rental_id,
            RentalEvent::ItemQuantityChanged(e) => e.rental_id,
            RentalEvent::ItemRemoved(e) => e.rental_id,
            RentalEvent::RentalRescheduled(e) => e.rental_id,
            RentalEvent::InternalUseChanged(e) => e.rental_id,
            RentalEvent::RentalReturned(e) => e.rental_id,
            RentalEvent::RentalReopened(e) => e.rental_id,
        }
    }
}

impl Event for RentalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RentalEvent::RentalOpened(_) => "rentals.rental.opened",
            RentalEvent::ItemAdded(_) => "rentals.rental.item_added",
            RentalEvent::ItemQuantityChanged(_) => "rentals.rental.item_quantity_changed",
            RentalEvent::ItemRemoved(_) => "rentals.rental.item_removed",
            RentalEvent::RentalRescheduled(_) => "rentals.rental.rescheduled",
            RentalEvent::InternalUseChanged(_) => "rentals.rental.internal_use_changed",
            RentalEvent::RentalReturned(_) => "rentals.rental.returned",
            RentalEvent::RentalReopened(_) => "rentals.rental.reopened",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RentalEvent::RentalOpened(e) => e.occurred_at,
            RentalEvent::ItemAdded(e) => e.occurred_at,
            RentalEvent::ItemQuantityChanged(e) => e.occurred_at,
            RentalEvent::ItemRemoved(e) => e.occurred_at,
            RentalEvent::RentalRescheduled(e) => e.occurred_at,
            RentalEvent::InternalUseChanged(e) => e.occurred_at,
            RentalEvent::RentalReturned(e) => e.occurred_at,
            RentalEvent::RentalReopened(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Rental {
    type Command = RentalCommand;
    type Event = RentalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RentalEvent::RentalOpened(e) => {
                self.id = e.rental_id;
                self.client_id = Some(e.client_id);
                self.rental_date = e.rental_date;
                self.expected_return_date = e.expected_return_date;
                self.internal_use = e.internal_use;
                self.returned = false;
                self.items.clear();
                self.next_line_no = 1;
                self.created = true;
            }
            RentalEvent::ItemAdded(e) => {
                self.items.push(RentalItem {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                });
                self.next_line_no = self.next_line_no.max(e.line_no + 1);
            }
            RentalEvent::ItemQuantityChanged(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.line_no == e.line_no) {
                    item.quantity = e.quantity;
                }
            }
            RentalEvent::ItemRemoved(e) => {
                self.items.retain(|i| i.line_no != e.line_no);
            }
            RentalEvent::RentalRescheduled(e) => {
                self.rental_date = e.rental_date;
                self.expected_return_date = e.expected_return_date;
            }
            RentalEvent::InternalUseChanged(e) => {
                self.internal_use = e.internal_use;
            }
            RentalEvent::RentalReturned(_) => {
                self.returned = true;
            }
            RentalEvent::RentalReopened(_) => {
                self.returned = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RentalCommand::OpenRental(cmd) => self.handle_open(cmd),
            RentalCommand::AddItem(cmd) => self.handle_add_item(cmd),
            RentalCommand::ChangeItemQuantity(cmd) => self.handle_change_quantity(cmd),
            RentalCommand::RemoveItem(cmd) => self.handle_remove_item(cmd),
            RentalCommand::MergeItems(cmd) => self.handle_merge(cmd),
            RentalCommand::Reschedule(cmd) => self.handle_reschedule(cmd),
            RentalCommand::SetInternalUse(cmd) => self.handle_internal_use(cmd),
            RentalCommand::MarkReturned(cmd) => self.handle_mark_returned(cmd),
            RentalCommand::ReopenRental(cmd) => self.handle_reopen(cmd),
        }
    }
}

fn ensure_positive(quantity: u32) -> Result<(), DomainError> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

impl Rental {
    fn ensure_existing(&self, rental_id: RentalId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != rental_id {
            return Err(DomainError::invariant("rental_id mismatch"));
        }
        Ok(())
    }

    fn existing_item(&self, line_no: u32) -> Result<&RentalItem, DomainError> {
        self.item(line_no)
            .ok_or_else(|| DomainError::validation(format!("rental has no item line {line_no}")))
    }

    fn handle_open(&self, cmd: &OpenRental) -> Result<Vec<RentalEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("rental already exists"));
        }

        Ok(vec![RentalEvent::RentalOpened(RentalOpened {
            rental_id: cmd.rental_id,
            client_id: cmd.client_id,
            rental_date: cmd.rental_date,
            expected_return_date: cmd.expected_return_date,
            internal_use: cmd.internal_use,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddItem) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;
        ensure_positive(cmd.quantity)?;

        Ok(vec![RentalEvent::ItemAdded(ItemAdded {
            rental_id: cmd.rental_id,
            line_no: self.next_line_no,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_quantity(
        &self,
        cmd: &ChangeItemQuantity,
    ) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;
        ensure_positive(cmd.quantity)?;
        let item = self.existing_item(cmd.line_no)?;

        if item.quantity == cmd.quantity {
            return Ok(vec![]);
        }

        Ok(vec![RentalEvent::ItemQuantityChanged(ItemQuantityChanged {
            rental_id: cmd.rental_id,
            line_no: cmd.line_no,
            product_id: item.product_id,
            previous_quantity: item.quantity,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_item(&self, cmd: &RemoveItem) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;
        let item = self.existing_item(cmd.line_no)?;

        Ok(vec![RentalEvent::ItemRemoved(ItemRemoved {
            rental_id: cmd.rental_id,
            line_no: cmd.line_no,
            product_id: item.product_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_merge(&self, cmd: &MergeItems) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;

        let events = self
            .plan_merge(&cmd.requests)
            .into_iter()
            .map(|step| match step {
                MergeStep::Increment {
                    line_no,
                    product_id,
                    from,
                    to,
                } => RentalEvent::ItemQuantityChanged(ItemQuantityChanged {
                    rental_id: cmd.rental_id,
                    line_no,
                    product_id,
                    previous_quantity: from,
                    quantity: to,
                    occurred_at: cmd.occurred_at,
                }),
                MergeStep::Create {
                    line_no,
                    product_id,
                    quantity,
                } => RentalEvent::ItemAdded(ItemAdded {
                    rental_id: cmd.rental_id,
                    line_no,
                    product_id,
                    quantity,
                    occurred_at: cmd.occurred_at,
                }),
            })
            .collect();

        Ok(events)
    }

    fn handle_reschedule(&self, cmd: &Reschedule) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;

        if cmd.rental_date == self.rental_date
            && cmd.expected_return_date == self.expected_return_date
        {
            return Ok(vec![]);
        }

        Ok(vec![RentalEvent::RentalRescheduled(RentalRescheduled {
            rental_id: cmd.rental_id,
            rental_date: cmd.rental_date,
            expected_return_date: cmd.expected_return_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_internal_use(&self, cmd: &SetInternalUse) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;

        if cmd.internal_use == self.internal_use {
            return Ok(vec![]);
        }

        Ok(vec![RentalEvent::InternalUseChanged(InternalUseChanged {
            rental_id: cmd.rental_id,
            internal_use: cmd.internal_use,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_returned(&self, cmd: &MarkReturned) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;

        if self.returned {
            return Err(DomainError::conflict("rental is already returned"));
        }

        Ok(vec![RentalEvent::RentalReturned(RentalReturned {
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reopen(&self, cmd: &ReopenRental) -> Result<Vec<RentalEvent>, DomainError> {
        self.ensure_existing(cmd.rental_id)?;

        if !self.returned {
            return Err(DomainError::conflict("rental is not returned"));
        }

        Ok(vec![RentalEvent::RentalReopened(RentalReopened {
            rental_id: cmd.rental_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_rental_id() -> RentalId {
        RentalId::new(AggregateId::new())
    }

    fn test_client_id() -> ClientId {
        ClientId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn run(rental: &mut Rental, cmd: RentalCommand) -> Vec<RentalEvent> {
        let events = rental.handle(&cmd).unwrap();
        for e in &events {
            rental.apply(e);
        }
        events
    }

    fn opened(rental_id: RentalId) -> Rental {
        let mut rental = Rental::empty(rental_id);
        run(
            &mut rental,
            RentalCommand::OpenRental(OpenRental {
                rental_id,
                client_id: test_client_id(),
                rental_date: date(2024, 6, 1),
                expected_return_date: date(2024, 6, 4),
                internal_use: false,
                occurred_at: test_time(),
            }),
        );
        rental
    }

    fn add(rental: &mut Rental, product_id: ProductId, quantity: u32) -> u32 {
        let rental_id = rental.id_typed();
        match &run(
            rental,
            RentalCommand::AddItem(AddItem {
                rental_id,
                product_id,
                quantity,
                occurred_at: test_time(),
            }),
        )[0]
        {
            RentalEvent::ItemAdded(e) => e.line_no,
            _ => panic!("Expected ItemAdded event"),
        }
    }

    #[test]
    fn open_rental_emits_rental_opened_event() {
        let rental_id = test_rental_id();
        let client_id = test_client_id();
        let events = Rental::empty(rental_id)
            .handle(&RentalCommand::OpenRental(OpenRental {
                rental_id,
                client_id,
                rental_date: date(2024, 6, 1),
                expected_return_date: date(2024, 6, 1),
                internal_use: true,
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            RentalEvent::RentalOpened(e) => {
                assert_eq!(e.rental_id, rental_id);
                assert_eq!(e.client_id, client_id);
                assert!(e.internal_use);
            }
            _ => panic!("Expected RentalOpened event"),
        }
    }

    #[test]
    fn add_item_assigns_increasing_line_numbers() {
        let mut rental = opened(test_rental_id());
        let product = test_product_id();
        assert_eq!(add(&mut rental, product, 2), 1);
        assert_eq!(add(&mut rental, product, 1), 2);
        assert_eq!(rental.items().len(), 2);
    }

    #[test]
    fn line_numbers_are_not_reused_after_removal() {
        let rental_id = test_rental_id();
        let mut rental = opened(rental_id);
        let first = add(&mut rental, test_product_id(), 1);
        add(&mut rental, test_product_id(), 1);

        run(
            &mut rental,
            RentalCommand::RemoveItem(RemoveItem {
                rental_id,
                line_no: first,
                occurred_at: test_time(),
            }),
        );
        assert_eq!(add(&mut rental, test_product_id(), 1), 3);
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let rental_id = test_rental_id();
        let rental = opened(rental_id);
        let err = rental
            .handle(&RentalCommand::AddItem(AddItem {
                rental_id,
                product_id: test_product_id(),
                quantity: 0,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("positive")));
    }

    #[test]
    fn change_quantity_of_unknown_line_fails() {
        let rental_id = test_rental_id();
        let rental = opened(rental_id);
        let err = rental
            .handle(&RentalCommand::ChangeItemQuantity(ChangeItemQuantity {
                rental_id,
                line_no: 9,
                quantity: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("line 9")));
    }

    #[test]
    fn merge_increments_existing_and_creates_missing() {
        let rental_id = test_rental_id();
        let mut rental = opened(rental_id);
        let a = test_product_id();
        let b = test_product_id();
        add(&mut rental, a, 3);

        run(
            &mut rental,
            RentalCommand::MergeItems(MergeItems {
                rental_id,
                requests: vec![
                    ItemRequest { product_id: a, quantity: 2 },
                    ItemRequest { product_id: b, quantity: 1 },
                ],
                occurred_at: test_time(),
            }),
        );

        let qty = |p: ProductId| rental.items().iter().find(|i| i.product_id == p).map(|i| i.quantity);
        assert_eq!(qty(a), Some(5));
        assert_eq!(qty(b), Some(1));
        assert_eq!(rental.items().len(), 2);
    }

    #[test]
    fn return_and_reopen_toggle_flag() {
        let rental_id = test_rental_id();
        let mut rental = opened(rental_id);

        run(
            &mut rental,
            RentalCommand::MarkReturned(MarkReturned {
                rental_id,
                occurred_at: test_time(),
            }),
        );
        assert!(rental.is_returned());

        let err = rental
            .handle(&RentalCommand::MarkReturned(MarkReturned {
                rental_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        run(
            &mut rental,
            RentalCommand::ReopenRental(ReopenRental {
                rental_id,
                occurred_at: test_time(),
            }),
        );
        assert!(!rental.is_returned());
    }

    #[test]
    fn items_on_returned_rental_can_still_be_edited() {
        let rental_id = test_rental_id();
        let mut rental = opened(rental_id);
        let line = add(&mut rental, test_product_id(), 1);
        run(
            &mut rental,
            RentalCommand::MarkReturned(MarkReturned {
                rental_id,
                occurred_at: test_time(),
            }),
        );

        run(
            &mut rental,
            RentalCommand::ChangeItemQuantity(ChangeItemQuantity {
                rental_id,
                line_no: line,
                quantity: 4,
                occurred_at: test_time(),
            }),
        );
        assert_eq!(rental.item(line).map(|i| i.quantity), Some(4));
    }

    #[test]
    fn duration_is_floored_at_one_day() {
        let rental_id = test_rental_id();
        let mut rental = opened(rental_id);
        assert_eq!(rental.duration_days(), 3);

        run(
            &mut rental,
            RentalCommand::Reschedule(Reschedule {
                rental_id,
                rental_date: date(2024, 6, 10),
                expected_return_date: date(2024, 6, 10),
                occurred_at: test_time(),
            }),
        );
        assert_eq!(rental.duration_days(), 1);
    }

    #[test]
    fn commands_on_unopened_rental_are_not_found() {
        let rental_id = test_rental_id();
        let err = Rental::empty(rental_id)
            .handle(&RentalCommand::MarkReturned(MarkReturned {
                rental_id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn unchanged_internal_use_emits_nothing() {
        let rental_id = test_rental_id();
        let rental = opened(rental_id);
        let events = rental
            .handle(&RentalCommand::SetInternalUse(SetInternalUse {
                rental_id,
                internal_use: false,
                occurred_at: test_time(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn apply_is_deterministic() {
        let rental_id = test_rental_id();
        let product_id = test_product_id();
        let events = vec![
            RentalEvent::RentalOpened(RentalOpened {
                rental_id,
                client_id: test_client_id(),
                rental_date: date(2024, 1, 1),
                expected_return_date: date(2024, 1, 8),
                internal_use: false,
                occurred_at: test_time(),
            }),
            RentalEvent::ItemAdded(ItemAdded {
                rental_id,
                line_no: 1,
                product_id,
                quantity: 2,
                occurred_at: test_time(),
            }),
            RentalEvent::RentalReturned(RentalReturned {
                rental_id,
                occurred_at: test_time(),
            }),
        ];

        let mut r1 = Rental::empty(rental_id);
        let mut r2 = Rental::empty(rental_id);
        for e in &events {
            r1.apply(e);
            r2.apply(e);
        }

        assert_eq!(r1, r2);
        assert_eq!(r1.version(), 3);
        assert!(r1.is_returned());
    }
}
