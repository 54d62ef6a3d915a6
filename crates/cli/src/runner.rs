//! Executes a [`Script`] against a [`RentalDesk`].

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{info, warn};

use rentkit_bundles::BundleId;
use rentkit_clients::{ClientId, ContactInfo};
use rentkit_infra::{DeskError, NewProduct, NewRental, RentalDesk};
use rentkit_products::ProductId;
use rentkit_rentals::{ItemRef, RentalId};

use crate::script::{NameKind, Operation, Script, Step};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("step {step} ({op}): {source}")]
    Desk {
        step: usize,
        op: &'static str,
        #[source]
        source: DeskError,
    },

    #[error("step {step}: {kind} `{name}` was never created")]
    Unresolved {
        step: usize,
        kind: NameKind,
        name: String,
    },

    #[error("step {step}: cannot encode result: {source}")]
    Encode {
        step: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub op: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Default)]
struct Names {
    clients: HashMap<String, ClientId>,
    products: HashMap<String, ProductId>,
    bundles: HashMap<String, BundleId>,
    rentals: HashMap<String, RentalId>,
    items: HashMap<String, ItemRef>,
}

pub struct Runner<'d> {
    desk: &'d RentalDesk,
    names: Names,
}

enum StepFailure {
    Desk(DeskError),
    Run(RunError),
}

impl From<DeskError> for StepFailure {
    fn from(value: DeskError) -> Self {
        StepFailure::Desk(value)
    }
}

impl From<RunError> for StepFailure {
    fn from(value: RunError) -> Self {
        StepFailure::Run(value)
    }
}

impl<'d> Runner<'d> {
    pub fn new(desk: &'d RentalDesk) -> Self {
        Self {
            desk,
            names: Names::default(),
        }
    }

    /// Run every step in order.
    ///
    /// Stops at the first failing step unless it allows failure, in which
    /// case the error is recorded in its report.
    pub fn run(&mut self, script: &Script) -> Result<Vec<StepReport>, RunError> {
        let mut reports = Vec::with_capacity(script.len());

        for (idx, step) in script.steps.iter().enumerate() {
            let number = idx + 1;
            let op = step.op.name();

            match self.execute(number, step) {
                Ok(result) => {
                    info!(step = number, op, "step completed");
                    reports.push(StepReport {
                        step: number,
                        op,
                        result,
                        error: None,
                    });
                }
                Err(StepFailure::Desk(err)) if step.allow_failure => {
                    warn!(step = number, op, error = %err, "step failed");
                    reports.push(StepReport {
                        step: number,
                        op,
                        result: None,
                        error: Some(err.to_string()),
                    });
                }
                Err(StepFailure::Desk(source)) => {
                    return Err(RunError::Desk {
                        step: number,
                        op,
                        source,
                    });
                }
                Err(StepFailure::Run(err)) => return Err(err),
            }
        }

        Ok(reports)
    }

    fn execute(&mut self, number: usize, step: &Step) -> Result<Option<JsonValue>, StepFailure> {
        let desk = self.desk;

        match &step.op {
            Operation::RegisterClient {
                key,
                name,
                email,
                phone,
            } => {
                let contact = ContactInfo {
                    email: email.clone(),
                    phone: phone.clone(),
                };
                let id = desk.register_client(name.clone(), contact)?;
                self.names.clients.insert(key.clone(), id);
                Ok(Some(encode(number, &id)?))
            }
            Operation::UpdateClient {
                client,
                name,
                email,
                phone,
                clear_email,
            } => {
                let client_id = self.client(number, client)?;
                let contact = if email.is_some() || phone.is_some() || *clear_email {
                    let current = desk.client(client_id)?;
                    let email = if *clear_email {
                        None
                    } else {
                        email.clone().or(current.email)
                    };
                    Some(ContactInfo {
                        email,
                        phone: phone.clone().unwrap_or(current.phone),
                    })
                } else {
                    None
                };
                desk.update_client(client_id, name.clone(), contact)?;
                Ok(None)
            }
            Operation::CreateProduct {
                key,
                name,
                daily_price,
                total_stock,
                image,
            } => {
                let mut product = NewProduct::new(name.clone(), *daily_price).with_stock(*total_stock);
                if let Some(image) = image {
                    product = product.with_image(image.clone());
                }
                let id = desk.create_product(product)?;
                self.names.products.insert(key.clone(), id);
                Ok(Some(encode(number, &id)?))
            }
            Operation::UpdateProduct {
                product,
                name,
                image,
                clear_image,
            } => {
                let product_id = self.product(number, product)?;
                let image = if *clear_image {
                    Some(None)
                } else {
                    image.clone().map(Some)
                };
                desk.update_product_details(product_id, name.clone(), image)?;
                Ok(None)
            }
            Operation::ChangeDailyPrice { product, daily_price } => {
                desk.change_daily_price(self.product(number, product)?, *daily_price)?;
                Ok(None)
            }
            Operation::SetTotalStock { product, total_stock } => {
                desk.set_total_stock(self.product(number, product)?, *total_stock)?;
                Ok(None)
            }
            Operation::CreateBundle { key, name, description } => {
                let id = desk.create_bundle(name.clone(), description.clone())?;
                self.names.bundles.insert(key.clone(), id);
                Ok(Some(encode(number, &id)?))
            }
            Operation::RenameBundle {
                bundle,
                name,
                description,
            } => {
                desk.rename_bundle(self.bundle(number, bundle)?, name.clone(), description.clone())?;
                Ok(None)
            }
            Operation::AddBundleLine {
                bundle,
                product,
                quantity,
            } => {
                let line_no = desk.add_bundle_line(
                    self.bundle(number, bundle)?,
                    self.product(number, product)?,
                    *quantity,
                )?;
                Ok(Some(JsonValue::from(line_no)))
            }
            Operation::RemoveBundleLine { bundle, line_no } => {
                desk.remove_bundle_line(self.bundle(number, bundle)?, *line_no)?;
                Ok(None)
            }
            Operation::OpenRental {
                key,
                client,
                rental_date,
                expected_return_date,
                internal_use,
            } => {
                let id = desk.open_rental(NewRental {
                    client_id: self.client(number, client)?,
                    rental_date: *rental_date,
                    expected_return_date: *expected_return_date,
                    internal_use: *internal_use,
                })?;
                self.names.rentals.insert(key.clone(), id);
                Ok(Some(encode(number, &id)?))
            }
            Operation::AddItem {
                key,
                rental,
                product,
                quantity,
            } => {
                let item = desk.add_item(
                    self.rental(number, rental)?,
                    self.product(number, product)?,
                    *quantity,
                )?;
                if let Some(key) = key {
                    self.names.items.insert(key.clone(), item);
                }
                Ok(Some(encode(number, &item)?))
            }
            Operation::ChangeItemQuantity { item, quantity } => {
                desk.change_item_quantity(self.item(number, item)?, *quantity)?;
                Ok(None)
            }
            Operation::RemoveItem { item } => {
                desk.remove_item(self.item(number, item)?)?;
                Ok(None)
            }
            Operation::Reschedule {
                rental,
                rental_date,
                expected_return_date,
            } => {
                desk.reschedule(self.rental(number, rental)?, *rental_date, *expected_return_date)?;
                Ok(None)
            }
            Operation::SetInternalUse { rental, internal_use } => {
                desk.set_internal_use(self.rental(number, rental)?, *internal_use)?;
                Ok(None)
            }
            Operation::MarkReturned { rental } => {
                desk.mark_returned(self.rental(number, rental)?)?;
                Ok(None)
            }
            Operation::Reopen { rental } => {
                desk.reopen(self.rental(number, rental)?)?;
                Ok(None)
            }
            Operation::ApplyBundles { rental, bundles } => {
                let rental_id = self.rental(number, rental)?;
                let bundle_ids = bundles
                    .iter()
                    .map(|b| self.bundle(number, b))
                    .collect::<Result<Vec<_>, _>>()?;
                let outcomes = desk.apply_bundles(rental_id, &bundle_ids)?;
                Ok(Some(encode(number, &outcomes)?))
            }
            Operation::ProductAvailability { product } => {
                let row = desk.product_availability(self.product(number, product)?)?;
                Ok(Some(encode(number, &row)?))
            }
            Operation::ListProducts { search } => Ok(Some(encode(number, &desk.list_products(search.as_deref()))?)),
            Operation::RentalTotal { rental } => {
                let total = desk.rental_total(self.rental(number, rental)?)?;
                Ok(Some(encode(number, &total)?))
            }
            Operation::Receipt { rental } => {
                let receipt = desk.receipt(self.rental(number, rental)?)?;
                Ok(Some(encode(number, &receipt)?))
            }
            Operation::ListRentals { filter } => Ok(Some(encode(number, &desk.list_rentals(filter))?)),
            Operation::ListBundles => Ok(Some(encode(number, &desk.list_bundles())?)),
            Operation::RebuildReadModels => {
                let replayed = desk.rebuild_read_models()?;
                Ok(Some(JsonValue::from(replayed)))
            }
        }
    }

    fn client(&self, step: usize, name: &str) -> Result<ClientId, RunError> {
        lookup(&self.names.clients, step, NameKind::Client, name)
    }

    fn product(&self, step: usize, name: &str) -> Result<ProductId, RunError> {
        lookup(&self.names.products, step, NameKind::Product, name)
    }

    fn bundle(&self, step: usize, name: &str) -> Result<BundleId, RunError> {
        lookup(&self.names.bundles, step, NameKind::Bundle, name)
    }

    fn rental(&self, step: usize, name: &str) -> Result<RentalId, RunError> {
        lookup(&self.names.rentals, step, NameKind::Rental, name)
    }

    fn item(&self, step: usize, name: &str) -> Result<ItemRef, RunError> {
        lookup(&self.names.items, step, NameKind::Item, name)
    }
}

fn lookup<T: Copy>(map: &HashMap<String, T>, step: usize, kind: NameKind, name: &str) -> Result<T, RunError> {
    map.get(name).copied().ok_or_else(|| RunError::Unresolved {
        step,
        kind,
        name: name.to_string(),
    })
}

fn encode<T: Serialize>(step: usize, value: &T) -> Result<JsonValue, RunError> {
    serde_json::to_value(value).map_err(|source| RunError::Encode { step, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GARDEN_PARTY: &str = include_str!("../demos/garden_party.json");

    fn run(json: &str) -> Result<Vec<StepReport>, RunError> {
        let desk = RentalDesk::default();
        let script = Script::parse(json).unwrap();
        Runner::new(&desk).run(&script)
    }

    #[test]
    fn demo_script_runs_to_completion() {
        let reports = run(GARDEN_PARTY).unwrap();
        let receipt = reports
            .iter()
            .find(|r| r.op == "receipt")
            .and_then(|r| r.result.clone())
            .unwrap();

        assert_eq!(receipt["total"], "372.00");
        assert_eq!(receipt["lines"].as_array().unwrap().len(), 3);

        let refused = reports.iter().find(|r| r.error.is_some()).unwrap();
        assert_eq!(refused.op, "add_item");
        assert_eq!(
            refused.error.as_deref(),
            Some("insufficient stock for Table: only 1 remain")
        );
    }

    #[test]
    fn failing_step_stops_the_run() {
        let err = run(
            r#"[
                {"op": "register_client", "as": "ana", "name": "Ana", "phone": "1"},
                {"op": "create_product", "as": "tent", "name": "Tent", "daily_price": "45.00", "total_stock": 1},
                {"op": "open_rental", "as": "r1", "client": "ana", "rental_date": "2024-06-01", "expected_return_date": "2024-06-02"},
                {"op": "add_item", "rental": "r1", "product": "tent", "quantity": 2},
                {"op": "list_products"}
            ]"#,
        )
        .unwrap_err();

        assert!(matches!(
            err,
            RunError::Desk { step: 4, op: "add_item", source: DeskError::InsufficientStock { .. } }
        ));
    }

    #[test]
    fn names_from_failed_steps_stay_unresolved() {
        let err = run(
            r#"[
                {"op": "register_client", "as": "ana", "name": " ", "phone": "1", "allow_failure": true},
                {"op": "open_rental", "as": "r1", "client": "ana", "expected_return_date": "2024-06-02"}
            ]"#,
        )
        .unwrap_err();

        assert!(matches!(err, RunError::Unresolved { step: 2, kind: NameKind::Client, .. }));
    }

    #[test]
    fn update_client_keeps_unset_contact_fields() {
        let desk = RentalDesk::default();
        let script = Script::parse(
            r#"[
                {"op": "register_client", "as": "ana", "name": "Ana", "email": "ana@example.com", "phone": "1"},
                {"op": "update_client", "client": "ana", "phone": "2"}
            ]"#,
        )
        .unwrap();
        let reports = Runner::new(&desk).run(&script).unwrap();

        let client_id: ClientId = serde_json::from_value(reports[0].result.clone().unwrap()).unwrap();
        let client = desk.client(client_id).unwrap();
        assert_eq!(client.email.as_deref(), Some("ana@example.com"));
        assert_eq!(client.phone, "2");
    }

    #[test]
    fn update_client_can_clear_the_email() {
        let desk = RentalDesk::default();
        let script = Script::parse(
            r#"[
                {"op": "register_client", "as": "ana", "name": "Ana", "email": "ana@example.com", "phone": "1"},
                {"op": "update_client", "client": "ana", "clear_email": true}
            ]"#,
        )
        .unwrap();
        let reports = Runner::new(&desk).run(&script).unwrap();

        let client_id: ClientId = serde_json::from_value(reports[0].result.clone().unwrap()).unwrap();
        let client = desk.client(client_id).unwrap();
        assert_eq!(client.email, None);
        assert_eq!(client.phone, "1");
    }
}
