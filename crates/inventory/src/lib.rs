//! Inventory ledger domain module.
//!
//! Per (product, warehouse) stock quantities and the rules for deducting from
//! them, implemented purely as deterministic domain logic (no IO, no storage).
//! Locking is the storage layer's job; this crate decides what a locked row
//! may be turned into.

pub mod selection;
pub mod stock;

pub use selection::select_warehouse;
pub use stock::{StockEntry, StockShortfall};
