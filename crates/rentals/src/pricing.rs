//! Rental pricing.
//!
//! A line costs `daily price x quantity x days`; internal-use rentals cost
//! nothing. Prices are always read from the product's current daily price.
//! Amounts that leave the decimal range are errors, never panics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rentkit_core::{DomainResult, Money};
use rentkit_products::ProductId;

use crate::rental::{Rental, RentalItem};

/// Days between the two dates, never less than one.
///
/// A same-day (or backwards) rental still bills one day.
pub fn duration_days(rental_date: NaiveDate, expected_return_date: NaiveDate) -> i64 {
    (expected_return_date - rental_date).num_days().max(1)
}

pub fn partial_price(internal_use: bool, days: i64, daily_price: Money, quantity: u32) -> DomainResult<Money> {
    if internal_use {
        return Ok(Money::ZERO);
    }
    daily_price.times(i64::from(quantity))?.times(days)
}

/// Sum of line prices; zero for internal use regardless of the lines.
pub fn grand_total(internal_use: bool, partials: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
    if internal_use {
        return Ok(Money::ZERO);
    }
    Money::checked_sum(partials)
}

/// A priced item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub daily_price: Money,
    pub partial: Money,
}

/// A rental priced at current product prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub days: i64,
    pub lines: Vec<QuotedLine>,
    pub total: Money,
}

/// Price `items` for a rental over the given dates with `price_of`.
///
/// Items whose product has no price (unknown product) are priced at zero.
pub fn quote<'a>(
    rental_date: NaiveDate,
    expected_return_date: NaiveDate,
    internal_use: bool,
    items: impl IntoIterator<Item = &'a RentalItem>,
    price_of: impl Fn(ProductId) -> Option<Money>,
) -> DomainResult<Quote> {
    let days = duration_days(rental_date, expected_return_date);

    let lines = items
        .into_iter()
        .map(|item| {
            let daily_price = price_of(item.product_id).unwrap_or(Money::ZERO);
            Ok(QuotedLine {
                line_no: item.line_no,
                product_id: item.product_id,
                quantity: item.quantity,
                daily_price,
                partial: partial_price(internal_use, days, daily_price, item.quantity)?,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;

    let total = grand_total(internal_use, lines.iter().map(|l| l.partial))?;
    Ok(Quote { days, lines, total })
}

impl Rental {
    /// Price every item at current product prices.
    pub fn quote(&self, price_of: impl Fn(ProductId) -> Option<Money>) -> DomainResult<Quote> {
        quote(
            self.rental_date(),
            self.expected_return_date(),
            self.is_internal_use(),
            self.items(),
            price_of,
        )
    }
}
