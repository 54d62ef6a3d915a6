//! Row types returned by the desk's listing queries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rentkit_bundles::BundleId;
use rentkit_core::Money;
use rentkit_inventory::StockStatus;
use rentkit_products::ProductId;
use rentkit_rentals::RentalId;

use crate::projections::RentalReadModel;

/// A product with its current availability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAvailability {
    pub product_id: ProductId,
    pub name: String,
    pub daily_price: Money,
    pub total_stock: u32,
    /// Units on rentals that are not returned.
    pub committed: i64,
    pub available: i64,
    pub status: StockStatus,
}

/// Which rentals `list_rentals` returns. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RentalFilter {
    pub returned: Option<bool>,
    pub internal_use: Option<bool>,
    /// Case-insensitive substring of the client's name.
    pub client_name: Option<String>,
    /// Earliest rental date, inclusive.
    pub rental_date_from: Option<NaiveDate>,
    /// Latest rental date, inclusive.
    pub rental_date_to: Option<NaiveDate>,
    /// Leading characters of the rental id, as printed in titles.
    pub id_prefix: Option<String>,
}

impl RentalFilter {
    pub fn matches(&self, rental: &RentalReadModel, client_name: &str) -> bool {
        if self.returned.is_some_and(|r| r != rental.returned) {
            return false;
        }
        if self.internal_use.is_some_and(|i| i != rental.internal_use) {
            return false;
        }
        if self.rental_date_from.is_some_and(|from| rental.rental_date < from) {
            return false;
        }
        if self.rental_date_to.is_some_and(|to| rental.rental_date > to) {
            return false;
        }
        if let Some(prefix) = &self.id_prefix {
            let prefix = prefix.trim().to_lowercase();
            if !rental.rental_id.to_string().starts_with(&prefix) {
                return false;
            }
        }
        match &self.client_name {
            Some(needle) => contains_ignore_case(client_name, needle),
            None => true,
        }
    }
}

pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalSummary {
    pub rental_id: RentalId,
    pub title: String,
    pub client_name: String,
    pub rental_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub returned: bool,
    pub internal_use: bool,
    pub item_count: usize,
    /// `None` when the amount is out of range.
    pub total: Option<Money>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSummary {
    pub bundle_id: BundleId,
    pub name: String,
    pub description: String,
    pub line_count: usize,
}
