//! Products domain module (event-sourced).
//!
//! Rentable products: what they cost per day and how many units the shop
//! owns. How many of those units are out on rental is not known here; see
//! `rentkit-inventory`.

pub mod product;

pub use product::{
    ChangeDailyPrice, CreateProduct, DailyPriceChanged, Product, ProductCommand, ProductCreated,
    ProductDetailsUpdated, ProductEvent, ProductId, SetTotalStock, TotalStockSet,
    UpdateProductDetails,
};
