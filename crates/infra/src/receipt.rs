//! Printable receipt data for a rental.
//!
//! Rendering is left to the caller; this only gathers what a receipt shows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rentkit_core::{DomainResult, Money};
use rentkit_products::ProductId;
use rentkit_rentals::RentalId;

use crate::projections::{ClientReadModel, ProductReadModel, RentalReadModel};

const UNKNOWN_PRODUCT: &str = "unknown product";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    pub daily_price: Money,
    pub partial: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalReceipt {
    pub rental_id: RentalId,
    pub title: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: String,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub duration_days: i64,
    pub returned: bool,
    pub internal_use: bool,
    pub lines: Vec<ReceiptLine>,
    pub total: Money,
}

/// `Rental #<short id> - <client>`, suffixed ` (INTERNAL)` for internal use.
pub fn rental_title(rental_id: RentalId, client_name: &str, internal_use: bool) -> String {
    let mut title = format!("Rental #{} - {}", rental_id.0.short(), client_name);
    if internal_use {
        title.push_str(" (INTERNAL)");
    }
    title
}

impl RentalReceipt {
    /// Price `rental` at current product prices and attach client details.
    pub fn build(
        rental: &RentalReadModel,
        client: &ClientReadModel,
        product_of: impl Fn(ProductId) -> Option<ProductReadModel>,
    ) -> DomainResult<Self> {
        let quote = rental.quote(|p| product_of(p).map(|rm| rm.daily_price))?;

        let lines = quote
            .lines
            .into_iter()
            .map(|l| ReceiptLine {
                line_no: l.line_no,
                product_id: l.product_id,
                product_name: product_of(l.product_id)
                    .map(|rm| rm.name)
                    .unwrap_or_else(|| UNKNOWN_PRODUCT.to_string()),
                quantity: l.quantity,
                daily_price: l.daily_price,
                partial: l.partial,
            })
            .collect();

        Ok(Self {
            rental_id: rental.rental_id,
            title: rental_title(rental.rental_id, &client.name, rental.internal_use),
            client_name: client.name.clone(),
            client_email: client.email.clone(),
            client_phone: client.phone.clone(),
            rental_date: rental.rental_date,
            expected_return_date: rental.expected_return_date,
            duration_days: quote.days,
            returned: rental.returned,
            internal_use: rental.internal_use,
            lines,
            total: quote.total,
        })
    }
}
