//! Catalog domain module.
//!
//! Products (name + unit price) and the warehouses that hold their stock,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod product;
pub mod warehouse;

pub use product::{NewProduct, Product, ProductUpdate};
pub use warehouse::{NewWarehouse, Warehouse};
