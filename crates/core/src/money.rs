//! [`Money`] amounts backed by [`Decimal`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Largest price in cents: 8 integer digits, 2 decimal places.
const MAX_PRICE_CENTS: i64 = 9_999_999_999;
const PRICE_DECIMAL_PLACES: u32 = 2;

/// Amount of money in the shop's single currency.
///
/// Daily prices are decimals with cents, so arithmetic stays exact.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Build from an integer number of cents (`1250` is 12.50).
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Multiply by a count of units (days, quantities).
    pub fn times(self, count: i64) -> DomainResult<Self> {
        self.0
            .checked_mul(Decimal::from(count))
            .map(Self)
            .ok_or_else(overflow)
    }

    pub fn checked_add(self, rhs: Money) -> DomainResult<Self> {
        self.0.checked_add(rhs.0).map(Self).ok_or_else(overflow)
    }

    /// Sum of `amounts`, failing instead of overflowing.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Self> {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }

    /// Whether this fits a price column: at most 8 integer digits and
    /// 2 decimal places.
    pub fn fits_price_bounds(&self) -> bool {
        self.0.normalize().scale() <= PRICE_DECIMAL_PLACES
            && self.0.abs() <= Decimal::new(MAX_PRICE_CENTS, PRICE_DECIMAL_PLACES)
    }
}

fn overflow() -> DomainError {
    DomainError::invariant("money amount out of range")
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cents_keeps_two_decimals() {
        assert_eq!(Money::from_cents(1250).amount(), Decimal::new(125, 1));
    }

    #[test]
    fn times_and_sum_are_exact() {
        let price = Money::from_cents(333);
        let total = Money::checked_sum([price.times(3).unwrap(), price.times(2).unwrap()]).unwrap();
        assert_eq!(total, Money::from_cents(1665));
    }

    #[test]
    fn overflow_is_an_error() {
        let huge = Money::from_cents(i64::MAX);
        assert!(matches!(
            huge.times(i64::from(u32::MAX)).and_then(|m| m.times(i64::MAX)),
            Err(DomainError::InvariantViolation(_))
        ));
        let max = Money::new(Decimal::MAX);
        assert!(max.checked_add(Money::from_cents(100)).is_err());
        assert!(Money::checked_sum([max, max]).is_err());
    }

    #[test]
    fn price_scale_limits() {
        assert!(Money::from_cents(4500).fits_price_bounds());
        assert!(Money::new(Decimal::new(45_000, 3)).fits_price_bounds());
        assert!(Money::from_cents(9_999_999_999).fits_price_bounds());
        assert!(!Money::new(Decimal::new(4_501, 3)).fits_price_bounds());
        assert!(!Money::from_cents(10_000_000_000).fits_price_bounds());
    }

    #[test]
    fn zero_is_not_negative() {
        assert!(!Money::ZERO.is_negative());
        assert!(Money::from_cents(-1).is_negative());
    }

    #[test]
    fn serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(1999)).unwrap();
        assert_eq!(json, "\"19.99\"");
        let back: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Money::from_cents(1999));
    }
}
