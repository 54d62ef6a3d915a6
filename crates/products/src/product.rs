use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError, Money};
use rentkit_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    image: Option<String>,
    daily_price: Money,
    total_stock: u32,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            name: String::new(),
            image: None,
            daily_price: Money::ZERO,
            total_stock: 0,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Image reference (path or URL), if one was uploaded.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn daily_price(&self) -> Money {
        self.daily_price
    }

    /// Units owned, rented out or not.
    pub fn total_stock(&self) -> u32 {
        self.total_stock
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub daily_price: Money,
    pub total_stock: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProductDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProductDetails {
    pub product_id: ProductId,
    /// New name (if None, keep existing).
    pub name: Option<String>,
    /// `Some(None)` removes the image; `None` keeps it.
    pub image: Option<Option<String>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeDailyPrice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDailyPrice {
    pub product_id: ProductId,
    pub daily_price: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetTotalStock.
///
/// Whether the new total still covers units out on rental is checked by the
/// caller, which can see every rental.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTotalStock {
    pub product_id: ProductId,
    pub total_stock: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProductDetails(UpdateProductDetails),
    ChangeDailyPrice(ChangeDailyPrice),
    SetTotalStock(SetTotalStock),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub daily_price: Money,
    pub total_stock: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetailsUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub image: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DailyPriceChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPriceChanged {
    pub product_id: ProductId,
    pub daily_price: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TotalStockSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalStockSet {
    pub product_id: ProductId,
    pub total_stock: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductDetailsUpdated(ProductDetailsUpdated),
    DailyPriceChanged(DailyPriceChanged),
    TotalStockSet(TotalStockSet),
}

impl ProductEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductDetailsUpdated(e) => e.product_id,
            ProductEvent::DailyPriceChanged(e) => e.product_id,
            ProductEvent::TotalStockSet(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "products.product.created",
            ProductEvent::ProductDetailsUpdated(_) => "products.product.details_updated",
            ProductEvent::DailyPriceChanged(_) => "products.product.daily_price_changed",
            ProductEvent::TotalStockSet(_) => "products.product.total_stock_set",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductDetailsUpdated(e) => e.occurred_at,
            ProductEvent::DailyPriceChanged(e) => e.occurred_at,
            ProductEvent::TotalStockSet(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.name = e.name.clone();
                self.image = e.image.clone();
                self.daily_price = e.daily_price;
                self.total_stock = e.total_stock;
                self.created = true;
            }
            ProductEvent::ProductDetailsUpdated(e) => {
                self.name = e.name.clone();
                self.image = e.image.clone();
            }
            ProductEvent::DailyPriceChanged(e) => {
                self.daily_price = e.daily_price;
            }
            ProductEvent::TotalStockSet(e) => {
                self.total_stock = e.total_stock;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProductDetails(cmd) => self.handle_update_details(cmd),
            ProductCommand::ChangeDailyPrice(cmd) => self.handle_change_price(cmd),
            ProductCommand::SetTotalStock(cmd) => self.handle_set_stock(cmd),
        }
    }
}

fn ensure_price(price: Money) -> Result<(), DomainError> {
    if price.is_negative() {
        return Err(DomainError::validation("daily price cannot be negative"));
    }
    if !price.fits_price_bounds() {
        return Err(DomainError::validation(format!(
            "daily price {price} exceeds 8 integer digits or 2 decimal places"
        )));
    }
    Ok(())
}

impl Product {
    fn ensure_existing(&self, product_id: ProductId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        ensure_price(cmd.daily_price)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            name: cmd.name.trim().to_string(),
            image: cmd.image.clone(),
            daily_price: cmd.daily_price,
            total_stock: cmd.total_stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_details(
        &self,
        cmd: &UpdateProductDetails,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.product_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let image = cmd.image.clone().unwrap_or_else(|| self.image.clone());

        if name == self.name && image == self.image {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::ProductDetailsUpdated(ProductDetailsUpdated {
            product_id: cmd.product_id,
            name,
            image,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_price(&self, cmd: &ChangeDailyPrice) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.product_id)?;
        ensure_price(cmd.daily_price)?;

        if cmd.daily_price == self.daily_price {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::DailyPriceChanged(DailyPriceChanged {
            product_id: cmd.product_id,
            daily_price: cmd.daily_price,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_stock(&self, cmd: &SetTotalStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_existing(cmd.product_id)?;

        if cmd.total_stock == self.total_stock {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::TotalStockSet(TotalStockSet {
            product_id: cmd.product_id,
            total_stock: cmd.total_stock,
            occurred_at: cmd.occurred_at,
        })])
    }
}
