//! Cart domain module.
//!
//! A cart is the set of a user's pending selections. Each line is bound to the
//! warehouse chosen at add time and carries the unit price snapshotted then.

pub mod item;

pub use item::{CartItem, CartLine, CartTotal, ensure_positive_quantity};
