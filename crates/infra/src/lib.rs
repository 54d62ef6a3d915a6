//! Infrastructure layer: event store, dispatcher, projections and the rental
//! desk that ties them together.

pub mod command_dispatcher;
pub mod config;
pub mod desk;
pub mod event_store;
pub mod listing;
pub mod projections;
pub mod read_model;
pub mod receipt;


pub use config::DeskConfig;
pub use desk::{DeskError, DeskResult, NewProduct, NewRental, RentalDesk};
pub use listing::{BundleSummary, ProductAvailability, RentalFilter, RentalSummary};
pub use receipt::{ReceiptLine, RentalReceipt};
