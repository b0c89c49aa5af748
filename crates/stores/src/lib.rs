//! Stores domain module (event-sourced).
//!
//! A store is the shop an inventory belongs to. Every product, stock movement
//! and purchase order is scoped to exactly one store.

pub mod store;

pub use store::{
    CloseStore, ContactInfo, RegisterStore, Store, StoreClosed, StoreCommand, StoreEvent,
    StoreRegistered, StoreStatus, StoreUpdated, UpdateStore, STORE_AGGREGATE_TYPE,
};
