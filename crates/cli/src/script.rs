//! Operation scripts: a JSON array of steps run against one desk.
//!
//! Entities are created under a symbolic name (`"as"`) and later steps refer
//! to them by that name, so a script never needs to know generated ids.
//!
//! ```json
//! [
//!   {"op": "register_client", "as": "ana", "name": "Ana", "phone": "910000000"},
//!   {"op": "create_product", "as": "tent", "name": "Tent", "daily_price": "45.00", "total_stock": 3},
//!   {"op": "open_rental", "as": "r1", "client": "ana", "expected_return_date": "2024-06-04"},
//!   {"op": "add_item", "rental": "r1", "product": "tent", "quantity": 2},
//!   {"op": "receipt", "rental": "r1"}
//! ]
//! ```

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use rentkit_core::Money;
use rentkit_infra::RentalFilter;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("invalid script: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("step {step}: unknown {kind} `{name}`")]
    UnknownName {
        step: usize,
        kind: NameKind,
        name: String,
    },

    #[error("step {step}: {kind} `{name}` is already defined")]
    DuplicateName {
        step: usize,
        kind: NameKind,
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NameKind {
    Client,
    Product,
    Bundle,
    Rental,
    Item,
}

impl core::fmt::Display for NameKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let label = match self {
            NameKind::Client => "client",
            NameKind::Product => "product",
            NameKind::Bundle => "bundle",
            NameKind::Rental => "rental",
            NameKind::Item => "item",
        };
        f.write_str(label)
    }
}

/// One script entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub op: Operation,

    /// Record a failure of this step in the report instead of stopping.
    #[serde(default)]
    pub allow_failure: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    RegisterClient {
        #[serde(rename = "as")]
        key: String,
        name: String,
        #[serde(default)]
        email: Option<String>,
        phone: String,
    },
    UpdateClient {
        client: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        phone: Option<String>,
        /// Remove the stored email; wins over `email`.
        #[serde(default)]
        clear_email: bool,
    },
    CreateProduct {
        #[serde(rename = "as")]
        key: String,
        name: String,
        daily_price: Money,
        #[serde(default = "one")]
        total_stock: u32,
        #[serde(default)]
        image: Option<String>,
    },
    UpdateProduct {
        product: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        image: Option<String>,
        #[serde(default)]
        clear_image: bool,
    },
    ChangeDailyPrice {
        product: String,
        daily_price: Money,
    },
    SetTotalStock {
        product: String,
        total_stock: u32,
    },
    CreateBundle {
        #[serde(rename = "as")]
        key: String,
        name: String,
        #[serde(default)]
        description: String,
    },
    RenameBundle {
        bundle: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
    AddBundleLine {
        bundle: String,
        product: String,
        quantity: u32,
    },
    RemoveBundleLine {
        bundle: String,
        line_no: u32,
    },
    OpenRental {
        #[serde(rename = "as")]
        key: String,
        client: String,
        #[serde(default)]
        rental_date: Option<NaiveDate>,
        expected_return_date: NaiveDate,
        #[serde(default)]
        internal_use: bool,
    },
    AddItem {
        #[serde(rename = "as", default)]
        key: Option<String>,
        rental: String,
        product: String,
        quantity: u32,
    },
    ChangeItemQuantity {
        item: String,
        quantity: u32,
    },
    RemoveItem {
        item: String,
    },
    Reschedule {
        rental: String,
        rental_date: NaiveDate,
        expected_return_date: NaiveDate,
    },
    SetInternalUse {
        rental: String,
        internal_use: bool,
    },
    MarkReturned {
        rental: String,
    },
    Reopen {
        rental: String,
    },
    ApplyBundles {
        rental: String,
        bundles: Vec<String>,
    },
    ProductAvailability {
        product: String,
    },
    ListProducts {
        #[serde(default)]
        search: Option<String>,
    },
    RentalTotal {
        rental: String,
    },
    Receipt {
        rental: String,
    },
    ListRentals {
        #[serde(default)]
        filter: RentalFilter,
    },
    ListBundles,
    RebuildReadModels,
}

fn one() -> u32 {
    1
}

impl Operation {
    /// The `op` tag, for reports and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::RegisterClient { .. } => "register_client",
            Operation::UpdateClient { .. } => "update_client",
            Operation::CreateProduct { .. } => "create_product",
            Operation::UpdateProduct { .. } => "update_product",
            Operation::ChangeDailyPrice { .. } => "change_daily_price",
            Operation::SetTotalStock { .. } => "set_total_stock",
            Operation::CreateBundle { .. } => "create_bundle",
            Operation::RenameBundle { .. } => "rename_bundle",
            Operation::AddBundleLine { .. } => "add_bundle_line",
            Operation::RemoveBundleLine { .. } => "remove_bundle_line",
            Operation::OpenRental { .. } => "open_rental",
            Operation::AddItem { .. } => "add_item",
            Operation::ChangeItemQuantity { .. } => "change_item_quantity",
            Operation::RemoveItem { .. } => "remove_item",
            Operation::Reschedule { .. } => "reschedule",
            Operation::SetInternalUse { .. } => "set_internal_use",
            Operation::MarkReturned { .. } => "mark_returned",
            Operation::Reopen { .. } => "reopen",
            Operation::ApplyBundles { .. } => "apply_bundles",
            Operation::ProductAvailability { .. } => "product_availability",
            Operation::ListProducts { .. } => "list_products",
            Operation::RentalTotal { .. } => "rental_total",
            Operation::Receipt { .. } => "receipt",
            Operation::ListRentals { .. } => "list_rentals",
            Operation::ListBundles => "list_bundles",
            Operation::RebuildReadModels => "rebuild_read_models",
        }
    }

    /// Names this step refers to.
    fn references(&self) -> Vec<(NameKind, &str)> {
        use NameKind::*;
        match self {
            Operation::UpdateClient { client, .. } => vec![(Client, client.as_str())],
            Operation::UpdateProduct { product, .. }
            | Operation::ChangeDailyPrice { product, .. }
            | Operation::SetTotalStock { product, .. }
            | Operation::ProductAvailability { product } => vec![(Product, product.as_str())],
            Operation::RenameBundle { bundle, .. } | Operation::RemoveBundleLine { bundle, .. } => {
                vec![(Bundle, bundle.as_str())]
            }
            Operation::AddBundleLine { bundle, product, .. } => {
                vec![(Bundle, bundle.as_str()), (Product, product.as_str())]
            }
            Operation::OpenRental { client, .. } => vec![(Client, client.as_str())],
            Operation::AddItem { rental, product, .. } => {
                vec![(Rental, rental.as_str()), (Product, product.as_str())]
            }
            Operation::ChangeItemQuantity { item, .. } | Operation::RemoveItem { item } => {
                vec![(Item, item.as_str())]
            }
            Operation::Reschedule { rental, .. }
            | Operation::SetInternalUse { rental, .. }
            | Operation::MarkReturned { rental }
            | Operation::Reopen { rental }
            | Operation::RentalTotal { rental }
            | Operation::Receipt { rental } => vec![(Rental, rental.as_str())],
            Operation::ApplyBundles { rental, bundles } => std::iter::once((Rental, rental.as_str()))
                .chain(bundles.iter().map(|b| (Bundle, b.as_str())))
                .collect(),
            Operation::RegisterClient { .. }
            | Operation::CreateProduct { .. }
            | Operation::CreateBundle { .. }
            | Operation::ListProducts { .. }
            | Operation::ListRentals { .. }
            | Operation::ListBundles
            | Operation::RebuildReadModels => Vec::new(),
        }
    }

    /// The name this step defines, if any.
    fn definition(&self) -> Option<(NameKind, &str)> {
        match self {
            Operation::RegisterClient { key, .. } => Some((NameKind::Client, key)),
            Operation::CreateProduct { key, .. } => Some((NameKind::Product, key)),
            Operation::CreateBundle { key, .. } => Some((NameKind::Bundle, key)),
            Operation::OpenRental { key, .. } => Some((NameKind::Rental, key)),
            Operation::AddItem { key: Some(key), .. } => Some((NameKind::Item, key)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub steps: Vec<Step>,
}

impl Script {
    /// Parse and validate a script.
    pub fn parse(json: &str) -> Result<Self, ScriptError> {
        let steps: Vec<Step> = serde_json::from_str(json)?;
        let script = Self { steps };
        script.validate()?;
        Ok(script)
    }

    /// Every name is defined once, before it is used.
    ///
    /// Steps are numbered from 1. A step that may fail still defines its
    /// name here; the runner reports a later use as unknown if it did fail.
    pub fn validate(&self) -> Result<(), ScriptError> {
        let mut defined: HashSet<(NameKind, &str)> = HashSet::new();

        for (idx, step) in self.steps.iter().enumerate() {
            let number = idx + 1;
            for (kind, name) in step.op.references() {
                if !defined.contains(&(kind, name)) {
                    return Err(ScriptError::UnknownName {
                        step: number,
                        kind,
                        name: name.to_string(),
                    });
                }
            }
            if let Some((kind, name)) = step.op.definition() {
                if !defined.insert((kind, name)) {
                    return Err(ScriptError::DuplicateName {
                        step: number,
                        kind,
                        name: name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }
}
