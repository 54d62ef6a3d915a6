use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentkit_core::{Aggregate, AggregateId, AggregateRoot, DomainError};
use rentkit_events::Event;
use rentkit_products::ProductId;
use rentkit_rentals::ItemRequest;

/// Bundle identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(pub AggregateId);

impl BundleId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BundleId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// One template line of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Aggregate root: Bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    id: BundleId,
    name: String,
    description: String,
    lines: Vec<BundleLine>,
    next_line_no: u32,
    version: u64,
    created: bool,
}

impl Bundle {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: BundleId) -> Self {
        Self {
            id,
            name: String::new(),
            description: String::new(),
            lines: Vec::new(),
            next_line_no: 1,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BundleId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Template lines in the order they were added.
    pub fn lines(&self) -> &[BundleLine] {
        &self.lines
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// The bundle's lines as item requests, in template order.
    pub fn requests(&self) -> Vec<ItemRequest> {
        self.lines
            .iter()
            .map(|l| ItemRequest {
                product_id: l.product_id,
                quantity: l.quantity,
            })
            .collect()
    }
}

/// Flatten several bundles into one request list, bundle by bundle.
pub fn expand<'a>(bundles: impl IntoIterator<Item = &'a Bundle>) -> Vec<ItemRequest> {
    bundles.into_iter().flat_map(Bundle::requests).collect()
}

impl AggregateRoot for Bundle {
    type Id = BundleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateBundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBundle {
    pub bundle_id: BundleId,
    pub name: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RenameBundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameBundle {
    pub bundle_id: BundleId,
    pub name: Option<String>,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddBundleLine.
///
/// The product's existence is checked by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddBundleLine {
    pub bundle_id: BundleId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RemoveBundleLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveBundleLine {
    pub bundle_id: BundleId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleCommand {
    CreateBundle(CreateBundle),
    RenameBundle(RenameBundle),
    AddBundleLine(AddBundleLine),
    RemoveBundleLine(RemoveBundleLine),
}

/// Event: BundleCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleCreated {
    pub bundle_id: BundleId,
    pub name: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BundleRenamed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRenamed {
    pub bundle_id: BundleId,
    pub name: String,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BundleLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLineAdded {
    pub bundle_id: BundleId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BundleLineRemoved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLineRemoved {
    pub bundle_id: BundleId,
    pub line_no: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleEvent {
    BundleCreated(BundleCreated),
    BundleRenamed(BundleRenamed),
    BundleLineAdded(BundleLineAdded),
    BundleLineRemoved(BundleLineRemoved),
}

impl BundleEvent {
    pub fn bundle_id(&self) -> BundleId {
        match self {
            BundleEvent::BundleCreated(e) => e.bundle_id,
            BundleEvent::BundleRenamed(e) => e.bundle_id,
            BundleEvent::BundleLineAdded(e) => e.bundle_id,
            BundleEvent::BundleLineRemoved(e) => e.bundle_id,
        }
    }
}

impl Event for BundleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BundleEvent::BundleCreated(_) => "bundles.bundle.created",
            BundleEvent::BundleRenamed(_) => "bundles.bundle.renamed",
            BundleEvent::BundleLineAdded(_) => "bundles.bundle.line_added",
            BundleEvent::BundleLineRemoved(_) => "bundles.bundle.line_removed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BundleEvent::BundleCreated(e) => e.occurred_at,
            BundleEvent::BundleRenamed(e) => e.occurred_at,
            BundleEvent::BundleLineAdded(e) => e.occurred_at,
            BundleEvent::BundleLineRemoved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Bundle {
    type Command = BundleCommand;
    type Event = BundleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            BundleEvent::BundleCreated(e) => {
                self.id = e.bundle_id;
                self.name = e.name.clone();
                self.description = e.description.clone();
                self.lines.clear();
                self.next_line_no = 1;
                self.created = true;
            }
            BundleEvent::BundleRenamed(e) => {
                self.name = e.name.clone();
                self.description = e.description.clone();
            }
            BundleEvent::BundleLineAdded(e) => {
                self.lines.push(BundleLine {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                });
                self.next_line_no = self.next_line_no.max(e.line_no + 1);
            }
            BundleEvent::BundleLineRemoved(e) => {
                self.lines.retain(|l| l.line_no != e.line_no);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BundleCommand::CreateBundle(cmd) => self.handle_create(cmd),
            BundleCommand::RenameBundle(cmd) => self.handle_rename(cmd),
            BundleCommand::AddBundleLine(cmd) => self.handle_add_line(cmd),
            BundleCommand::RemoveBundleLine(cmd) => self.handle_remove_line(cmd),
        }
    }
}

impl Bundle {
    fn ensure_existing(&self, bundle_id: BundleId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != bundle_id {
            return Err(DomainError::invariant("bundle_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateBundle) -> Result<Vec<BundleEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("bundle already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }

        Ok(vec![BundleEvent::BundleCreated(BundleCreated {
            bundle_id: cmd.bundle_id,
            name: cmd.name.trim().to_string(),
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_rename(&self, cmd: &RenameBundle) -> Result<Vec<BundleEvent>, DomainError> {
        self.ensure_existing(cmd.bundle_id)?;

        let name = match &cmd.name {
            Some(n) if n.trim().is_empty() => {
                return Err(DomainError::validation("name cannot be empty"));
            }
            Some(n) => n.trim().to_string(),
            None => self.name.clone(),
        };
        let description = cmd
            .description
            .clone()
            .unwrap_or_else(|| self.description.clone());

        if name == self.name && description == self.description {
            return Ok(vec![]);
        }

        Ok(vec![BundleEvent::BundleRenamed(BundleRenamed {
            bundle_id: cmd.bundle_id,
            name,
            description,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddBundleLine) -> Result<Vec<BundleEvent>, DomainError> {
        self.ensure_existing(cmd.bundle_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![BundleEvent::BundleLineAdded(BundleLineAdded {
            bundle_id: cmd.bundle_id,
            line_no: self.next_line_no,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_remove_line(&self, cmd: &RemoveBundleLine) -> Result<Vec<BundleEvent>, DomainError> {
        self.ensure_existing(cmd.bundle_id)?;
        if !self.lines.iter().any(|l| l.line_no == cmd.line_no) {
            return Err(DomainError::validation(format!(
                "bundle has no line {}",
                cmd.line_no
            )));
        }

        Ok(vec![BundleEvent::BundleLineRemoved(BundleLineRemoved {
            bundle_id: cmd.bundle_id,
            line_no: cmd.line_no,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bundle_id() -> BundleId {
        BundleId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn run(bundle: &mut Bundle, cmd: BundleCommand) {
        for e in bundle.handle(&cmd).unwrap() {
            bundle.apply(&e);
        }
    }

    fn created(bundle_id: BundleId, name: &str) -> Bundle {
        let mut bundle = Bundle::empty(bundle_id);
        run(
            &mut bundle,
            BundleCommand::CreateBundle(CreateBundle {
                bundle_id,
                name: name.to_string(),
                description: "Tables and chairs".to_string(),
                occurred_at: Utc::now(),
            }),
        );
        bundle
    }

    fn add_line(bundle: &mut Bundle, product_id: ProductId, quantity: u32) {
        let bundle_id = bundle.id_typed();
        run(
            bundle,
            BundleCommand::AddBundleLine(AddBundleLine {
                bundle_id,
                product_id,
                quantity,
                occurred_at: Utc::now(),
            }),
        );
    }

    #[test]
    fn create_bundle_emits_bundle_created() {
        let bundle = created(test_bundle_id(), " Party kit ");
        assert_eq!(bundle.name(), "Party kit");
        assert!(bundle.lines().is_empty());
        assert_eq!(bundle.version(), 1);
    }

    #[test]
    fn lines_keep_template_order() {
        let mut bundle = created(test_bundle_id(), "Party kit");
        let a = test_product_id();
        let b = test_product_id();
        add_line(&mut bundle, a, 2);
        add_line(&mut bundle, b, 1);

        assert_eq!(
            bundle.requests(),
            vec![
                ItemRequest { product_id: a, quantity: 2 },
                ItemRequest { product_id: b, quantity: 1 },
            ]
        );
    }

    #[test]
    fn zero_quantity_line_is_rejected() {
        let bundle_id = test_bundle_id();
        let bundle = created(bundle_id, "Party kit");
        let err = bundle
            .handle(&BundleCommand::AddBundleLine(AddBundleLine {
                bundle_id,
                product_id: test_product_id(),
                quantity: 0,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn remove_line_drops_it_from_requests() {
        let bundle_id = test_bundle_id();
        let mut bundle = created(bundle_id, "Party kit");
        let a = test_product_id();
        add_line(&mut bundle, a, 2);
        add_line(&mut bundle, test_product_id(), 1);

        run(
            &mut bundle,
            BundleCommand::RemoveBundleLine(RemoveBundleLine {
                bundle_id,
                line_no: 2,
                occurred_at: Utc::now(),
            }),
        );
        assert_eq!(bundle.requests(), vec![ItemRequest { product_id: a, quantity: 2 }]);
    }

    #[test]
    fn removing_unknown_line_fails() {
        let bundle_id = test_bundle_id();
        let err = created(bundle_id, "Party kit")
            .handle(&BundleCommand::RemoveBundleLine(RemoveBundleLine {
                bundle_id,
                line_no: 3,
                occurred_at: Utc::now(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("line 3")));
    }

    #[test]
    fn rename_without_changes_emits_nothing() {
        let bundle_id = test_bundle_id();
        let events = created(bundle_id, "Party kit")
            .handle(&BundleCommand::RenameBundle(RenameBundle {
                bundle_id,
                name: Some("Party kit".to_string()),
                description: None,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn expand_concatenates_bundles_in_order() {
        let a = test_product_id();
        let b = test_product_id();
        let mut first = created(test_bundle_id(), "First");
        add_line(&mut first, a, 2);
        let mut second = created(test_bundle_id(), "Second");
        add_line(&mut second, b, 1);
        add_line(&mut second, a, 1);

        assert_eq!(
            expand([&first, &second]),
            vec![
                ItemRequest { product_id: a, quantity: 2 },
                ItemRequest { product_id: b, quantity: 1 },
                ItemRequest { product_id: a, quantity: 1 },
            ]
        );
    }

    #[test]
    fn apply_is_deterministic() {
        let bundle_id = test_bundle_id();
        let events = vec![
            BundleEvent::BundleCreated(BundleCreated {
                bundle_id,
                name: "Kit".to_string(),
                description: String::new(),
                occurred_at: Utc::now(),
            }),
            BundleEvent::BundleLineAdded(BundleLineAdded {
                bundle_id,
                line_no: 1,
                product_id: test_product_id(),
                quantity: 3,
                occurred_at: Utc::now(),
            }),
        ];

        let mut b1 = Bundle::empty(bundle_id);
        let mut b2 = Bundle::empty(bundle_id);
        for e in &events {
            b1.apply(e);
            b2.apply(e);
        }
        assert_eq!(b1, b2);
        assert_eq!(b1.version(), 2);
    }
}
