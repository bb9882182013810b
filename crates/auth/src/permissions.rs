use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier.
///
/// Permissions are modeled as opaque strings (e.g. "cart.write").
/// The wildcard `"*"` means "allow all" and is what the admin role resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: &'static str = "*";

    pub const CART_READ: &'static str = "cart.read";
    pub const CART_WRITE: &'static str = "cart.write";
    pub const CART_READ_ALL: &'static str = "cart.read_all";
    pub const CHECKOUT: &'static str = "checkout.create";
    pub const ORDERS_READ: &'static str = "orders.read";
    pub const ORDERS_READ_ALL: &'static str = "orders.read_all";
    pub const PAYMENTS_READ: &'static str = "payments.read";
    pub const PAYMENTS_READ_ALL: &'static str = "payments.read_all";
    pub const PAYMENTS_SETTLE: &'static str = "payments.settle";
    pub const CATALOG_READ: &'static str = "catalog.read";
    pub const CATALOG_WRITE: &'static str = "catalog.write";
    pub const INVENTORY_READ: &'static str = "inventory.read";
    pub const INVENTORY_WRITE: &'static str = "inventory.write";

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == Self::WILDCARD
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
