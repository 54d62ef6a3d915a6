use serde::{Deserialize, Serialize};

use rentkit_core::{DomainError, DomainResult};
use rentkit_products::ProductId;
use rentkit_rentals::ItemRef;

/// One rental item's claim on a product's stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub item: ItemRef,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Items of returned rentals no longer hold stock.
    pub rental_returned: bool,
}

impl Commitment {
    fn holds(&self, product_id: ProductId, excluding: Option<ItemRef>) -> bool {
        self.product_id == product_id && !self.rental_returned && Some(self.item) != excluding
    }
}

/// Units of `product_id` held by non-returned rentals, leaving out `excluding`.
pub fn committed_quantity<'a>(
    product_id: ProductId,
    commitments: impl IntoIterator<Item = &'a Commitment>,
    excluding: Option<ItemRef>,
) -> i64 {
    commitments
        .into_iter()
        .filter(|c| c.holds(product_id, excluding))
        .map(|c| i64::from(c.quantity))
        .sum()
}

/// Total stock minus committed units. May be negative when stock was
/// overbooked (e.g. by an unchecked bundle expansion).
pub fn available_stock<'a>(
    total_stock: u32,
    product_id: ProductId,
    commitments: impl IntoIterator<Item = &'a Commitment>,
    excluding: Option<ItemRef>,
) -> i64 {
    i64::from(total_stock) - committed_quantity(product_id, commitments, excluding)
}

/// Fail with [`DomainError::InsufficientStock`] unless `requested` units fit.
///
/// `candidate` is the item being written; its current quantity does not
/// count against itself.
pub fn ensure_available<'a>(
    product_name: &str,
    total_stock: u32,
    product_id: ProductId,
    commitments: impl IntoIterator<Item = &'a Commitment>,
    candidate: Option<ItemRef>,
    requested: u32,
) -> DomainResult<()> {
    let remaining = available_stock(total_stock, product_id, commitments, candidate);
    if i64::from(requested) > remaining {
        return Err(DomainError::insufficient_stock(product_name, remaining));
    }
    Ok(())
}

/// Coarse availability label used in product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    Unavailable,
    Low,
    InStock,
}

impl StockStatus {
    pub fn classify(available: i64, low_threshold: i64) -> Self {
        if available <= 0 {
            StockStatus::Unavailable
        } else if available < low_threshold {
            StockStatus::Low
        } else {
            StockStatus::InStock
        }
    }
}

impl core::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            StockStatus::Unavailable => "unavailable",
            StockStatus::Low => "low",
            StockStatus::InStock => "in stock",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rentkit_core::AggregateId;
    use rentkit_rentals::RentalId;

    fn pid() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn item(rental_id: RentalId, line_no: u32) -> ItemRef {
        ItemRef { rental_id, line_no }
    }

    fn commit(item: ItemRef, product_id: ProductId, quantity: u32, returned: bool) -> Commitment {
        Commitment {
            item,
            product_id,
            quantity,
            rental_returned: returned,
        }
    }

    #[test]
    fn second_item_exceeding_remaining_stock_is_rejected() {
        let chair = pid();
        let r1 = RentalId::new(AggregateId::new());
        let r2 = RentalId::new(AggregateId::new());
        let commitments = vec![commit(item(r1, 1), chair, 4, false)];

        assert_eq!(available_stock(10, chair, &commitments, None), 6);

        let err = ensure_available("Chair", 10, chair, &commitments, Some(item(r2, 1)), 7)
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock("Chair", 6));
        assert!(err.to_string().contains("only 6 remain"));

        assert!(ensure_available("Chair", 10, chair, &commitments, Some(item(r2, 1)), 6).is_ok());
    }

    #[test]
    fn returned_rentals_hold_no_stock() {
        let chair = pid();
        let r1 = RentalId::new(AggregateId::new());
        let commitments = vec![commit(item(r1, 1), chair, 4, true)];
        assert_eq!(available_stock(10, chair, &commitments, None), 10);
    }

    #[test]
    fn editing_an_item_does_not_count_its_old_quantity() {
        let chair = pid();
        let r1 = RentalId::new(AggregateId::new());
        let line = item(r1, 1);
        let commitments = vec![commit(line, chair, 8, false)];

        assert!(ensure_available("Chair", 10, chair, &commitments, Some(line), 10).is_ok());
        assert!(ensure_available("Chair", 10, chair, &commitments, None, 10).is_err());
    }

    #[test]
    fn other_products_are_ignored() {
        let chair = pid();
        let table = pid();
        let r1 = RentalId::new(AggregateId::new());
        let commitments = vec![commit(item(r1, 1), table, 9, false)];
        assert_eq!(available_stock(2, chair, &commitments, None), 2);
    }

    #[test]
    fn overbooked_stock_is_negative() {
        let chair = pid();
        let r1 = RentalId::new(AggregateId::new());
        let commitments = vec![commit(item(r1, 1), chair, 5, false)];
        assert_eq!(available_stock(3, chair, &commitments, None), -2);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(StockStatus::classify(-1, 3), StockStatus::Unavailable);
        assert_eq!(StockStatus::classify(0, 3), StockStatus::Unavailable);
        assert_eq!(StockStatus::classify(2, 3), StockStatus::Low);
        assert_eq!(StockStatus::classify(3, 3), StockStatus::InStock);
        assert_eq!(StockStatus::InStock.to_string(), "in stock");
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// available + units held by non-returned rentals = total.
            #[test]
            fn availability_balances_total(
                total in 0u32..1_000,
                items in prop::collection::vec((0u32..50, any::<bool>(), any::<bool>()), 0..20),
            ) {
                let chair = pid();
                let other = pid();
                let rental = RentalId::new(AggregateId::new());
                let commitments: Vec<Commitment> = items
                    .iter()
                    .enumerate()
                    .map(|(i, (qty, returned, is_chair))| {
                        let product = if *is_chair { chair } else { other };
                        commit(item(rental, i as u32 + 1), product, *qty, *returned)
                    })
                    .collect();

                let held: i64 = items
                    .iter()
                    .filter(|(_, returned, is_chair)| *is_chair && !*returned)
                    .map(|(qty, _, _)| i64::from(*qty))
                    .sum();

                let available = available_stock(total, chair, &commitments, None);
                prop_assert_eq!(available + held, i64::from(total));
            }

            /// Returning every rental restores full availability.
            #[test]
            fn returning_everything_frees_all_stock(
                total in 0u32..1_000,
                qtys in prop::collection::vec(0u32..50, 0..20),
            ) {
                let chair = pid();
                let rental = RentalId::new(AggregateId::new());
                let commitments: Vec<Commitment> = qtys
                    .iter()
                    .enumerate()
                    .map(|(i, q)| commit(item(rental, i as u32 + 1), chair, *q, true))
                    .collect();
                prop_assert_eq!(available_stock(total, chair, &commitments, None), i64::from(total));
            }
        }
    }
}
