//! Orders and payments domain module.
//!
//! An order is created from a cart snapshot together with exactly one payment
//! record. Both have one-directional status lifecycles; this crate owns the
//! transition rules, implemented purely as deterministic domain logic.

pub mod filter;
pub mod order;
pub mod payment;

pub use filter::OrderFilter;
pub use order::{Order, OrderItem, OrderLineInput, OrderStatus, ShippingAddress, order_total};
pub use payment::{Payment, PaymentMethod, PaymentStatus};
