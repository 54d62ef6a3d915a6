//! Merge-by-product: how requested quantities land on a rental's items.
//!
//! For each request, the first item already holding that product is
//! incremented; otherwise a new item is created. Items created earlier in
//! the same plan count as existing for later requests.

use serde::{Deserialize, Serialize};

use rentkit_products::ProductId;

use crate::rental::RentalItem;

/// A product and quantity to put on a rental (e.g. one bundle template line).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// One step of a merge plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    /// Raise an existing item's quantity from `from` to `to`.
    Increment {
        line_no: u32,
        product_id: ProductId,
        from: u32,
        to: u32,
    },
    /// Create a new item.
    Create {
        line_no: u32,
        product_id: ProductId,
        quantity: u32,
    },
}

impl MergeStep {
    pub fn line_no(&self) -> u32 {
        match self {
            MergeStep::Increment { line_no, .. } | MergeStep::Create { line_no, .. } => *line_no,
        }
    }

    pub fn product_id(&self) -> ProductId {
        match self {
            MergeStep::Increment { product_id, .. } | MergeStep::Create { product_id, .. } => {
                *product_id
            }
        }
    }

    /// Quantity the item holds after this step.
    pub fn resulting_quantity(&self) -> u32 {
        match self {
            MergeStep::Increment { to, .. } => *to,
            MergeStep::Create { quantity, .. } => *quantity,
        }
    }

    /// Whether this step adds a new item.
    pub fn is_create(&self) -> bool {
        matches!(self, MergeStep::Create { .. })
    }
}

/// Plan how `requests` merge into `items`.
///
/// `next_line_no` is the line number the rental would give its next new
/// item. Zero-quantity requests are skipped. Quantities saturate at
/// `u32::MAX`.
pub fn plan_merge(items: &[RentalItem], next_line_no: u32, requests: &[ItemRequest]) -> Vec<MergeStep> {
    let mut working: Vec<RentalItem> = items.to_vec();
    let mut next = next_line_no;
    let mut steps = Vec::new();

    for req in requests.iter().filter(|r| r.quantity > 0) {
        match working.iter_mut().find(|i| i.product_id == req.product_id) {
            Some(item) => {
                let from = item.quantity;
                item.quantity = item.quantity.saturating_add(req.quantity);
                steps.push(MergeStep::Increment {
                    line_no: item.line_no,
                    product_id: req.product_id,
                    from,
                    to: item.quantity,
                });
            }
            None => {
                working.push(RentalItem {
                    line_no: next,
                    product_id: req.product_id,
                    quantity: req.quantity,
                });
                steps.push(MergeStep::Create {
                    line_no: next,
                    product_id: req.product_id,
                    quantity: req.quantity,
                });
                next += 1;
            }
        }
    }

    steps
}

/// Where a merge plan leaves one touched item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineOutcome {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    /// The item did not exist before the plan.
    pub created: bool,
}

/// Final quantity per touched line, in first-touched order.
///
/// Several increments on one line collapse to the last `to`.
pub fn final_quantities(steps: &[MergeStep]) -> Vec<LineOutcome> {
    let mut out: Vec<LineOutcome> = Vec::new();
    for step in steps {
        match out.iter_mut().find(|o| o.line_no == step.line_no()) {
            Some(outcome) => outcome.quantity = step.resulting_quantity(),
            None => out.push(LineOutcome {
                line_no: step.line_no(),
                product_id: step.product_id(),
                quantity: step.resulting_quantity(),
                created: step.is_create(),
            }),
        }
    }
    out
}
