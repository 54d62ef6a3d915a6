//! Bundles domain module (event-sourced).
//!
//! A bundle is a named template of product lines that can be stamped onto a
//! rental in one go. Bundles never hold stock themselves.

pub mod bundle;

pub use bundle::{
    AddBundleLine, Bundle, BundleCommand, BundleCreated, BundleEvent, BundleId, BundleLine,
    BundleLineAdded, BundleLineRemoved, BundleRenamed, CreateBundle, RemoveBundleLine,
    RenameBundle, expand,
};
