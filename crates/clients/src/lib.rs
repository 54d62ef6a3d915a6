//! Clients domain module (event-sourced).
//!
//! The people and companies that rent products, implemented purely as
//! deterministic domain logic (no IO, no storage).

pub mod client;

pub use client::{
    Client, ClientCommand, ClientEvent, ClientId, ClientRegistered, ClientUpdated, ContactInfo,
    RegisterClient, UpdateClient,
};
