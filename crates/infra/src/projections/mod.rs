//! Projection implementations (read model builders).
//!
//! Projections consume committed event envelopes and build query-side read
//! models. All of them are:
//! - **Rebuildable**: can be reconstructed from the event store
//! - **Idempotent**: safe for at-least-once delivery (per-stream cursors)

pub mod cursor;

pub mod bundle_catalog;
pub mod client_directory;
pub mod product_catalog;
pub mod rental_ledger;

pub use bundle_catalog::{BUNDLE_AGGREGATE_TYPE, BundleCatalogProjection, BundleReadModel};
pub use client_directory::{CLIENT_AGGREGATE_TYPE, ClientDirectoryProjection, ClientReadModel};
pub use cursor::ProjectionError;
pub use product_catalog::{PRODUCT_AGGREGATE_TYPE, ProductCatalogProjection, ProductReadModel};
pub use rental_ledger::{RENTAL_AGGREGATE_TYPE, RentalLedgerProjection, RentalReadModel};
