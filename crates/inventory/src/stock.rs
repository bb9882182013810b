use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, ProductId, WarehouseId};

/// Available quantity of one product in one warehouse.
///
/// Invariant: `quantity >= 0`. Every constructor and transition upholds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

impl StockEntry {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId, quantity: i64) -> DomainResult<Self> {
        if quantity < 0 {
            return Err(DomainError::validation("stock quantity cannot be negative"));
        }
        Ok(Self {
            product_id,
            warehouse_id,
            quantity,
        })
    }

    /// A row that does not exist in the ledger reads as zero.
    pub fn absent(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
            quantity: 0,
        }
    }

    pub fn covers(&self, requested: i64) -> bool {
        requested <= self.quantity
    }

    /// Check a request against this (locked) row.
    pub fn check(&self, product_name: &str, requested: i64) -> Result<(), StockShortfall> {
        if self.covers(requested) {
            Ok(())
        } else {
            Err(StockShortfall {
                product_id: self.product_id,
                product_name: product_name.to_string(),
                warehouse_id: self.warehouse_id,
                available: self.quantity,
                requested,
            })
        }
    }

    /// Remove `amount` units.
    ///
    /// Callers validate with [`StockEntry::check`] under the same lock first;
    /// reaching the error branch here means that step was skipped.
    pub fn deduct(self, amount: i64) -> DomainResult<Self> {
        if amount <= 0 {
            return Err(DomainError::validation("deduction must be positive"));
        }
        if amount > self.quantity {
            return Err(DomainError::invariant(format!(
                "stock for product {} in warehouse {} would go negative ({} - {})",
                self.product_id, self.warehouse_id, self.quantity, amount
            )));
        }
        Ok(Self {
            quantity: self.quantity - amount,
            ..self
        })
    }
}

/// Not enough stock in the warehouse a cart line is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouse_id: WarehouseId,
    pub available: i64,
    pub requested: i64,
}

impl core::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "insufficient stock for {} in warehouse {}: {} available, {} requested",
            self.product_name, self.warehouse_id, self.available, self.requested
        )
    }
}
