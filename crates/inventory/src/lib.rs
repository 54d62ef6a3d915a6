//! Stock availability.
//!
//! A product's available stock is its total stock minus every unit booked on
//! a rental that has not been returned. This crate only computes; the rental
//! items it reads come from whoever holds them (see `rentkit-infra`).

pub mod availability;

pub use availability::{
    Commitment, StockStatus, available_stock, committed_quantity, ensure_available,
};
