//! Inventory domain module (event-sourced).
//!
//! The stock ledger is the only owner of on-hand quantities: every change is
//! an entry or exit movement, and an exit can never take a product below zero.
//! Pure domain logic (no IO, no storage).

pub mod alert;
pub mod ledger;

pub use alert::AlertLevel;
pub use ledger::{
    InventoryCommand, InventoryEvent, MovementKind, MovementRequest, RecordEntry, RecordExit,
    StockEntered, StockExited, StockLedger, StockMovement, STOCK_LEDGER_AGGREGATE_TYPE,
};
