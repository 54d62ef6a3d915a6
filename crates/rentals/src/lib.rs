//! Rentals domain module (event-sourced).
//!
//! A rental books products for a client over a date range. Its items are
//! lines inside the rental aggregate; pricing and the merge-by-product rule
//! used for bundles are pure functions over that state.

pub mod merge;
pub mod pricing;
pub mod rental;

pub use merge::{ItemRequest, LineOutcome, MergeStep, final_quantities, plan_merge};
pub use pricing::{Quote, QuotedLine, duration_days, grand_total, partial_price, quote};
pub use rental::{
    AddItem, ChangeItemQuantity, InternalUseChanged, ItemAdded, ItemQuantityChanged, ItemRef,
    ItemRemoved, MarkReturned, MergeItems, OpenRental, RemoveItem, Rental, RentalCommand,
    RentalEvent, RentalId, RentalItem, RentalOpened, RentalReopened, RentalRescheduled,
    RentalReturned, ReopenRental, Reschedule, SetInternalUse,
};
