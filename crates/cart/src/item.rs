use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{
    CartItemId, DomainError, DomainResult, Entity, Money, ProductId, UserId, WarehouseId,
};

/// One selected (product, warehouse) pair in a user's cart.
///
/// Unique per `(user_id, product_id, warehouse_id)`; the storage layer
/// enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    /// Unit price at the moment the item was added.
    pub unit_price: Money,
    pub created_at: DateTime<Utc>,
}

pub fn ensure_positive_quantity(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    Ok(())
}

impl CartItem {
    pub fn new(
        user_id: UserId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: i64,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        ensure_positive_quantity(quantity)?;
        if unit_price == Money::ZERO {
            return Err(DomainError::validation("unit price must be greater than zero"));
        }
        Ok(Self {
            id: CartItemId::new(),
            user_id,
            product_id,
            warehouse_id,
            quantity,
            unit_price,
            created_at: now,
        })
    }

    pub fn belongs_to(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    pub fn line_total(&self) -> DomainResult<Money> {
        self.unit_price.times(self.quantity)
    }
}

impl Entity for CartItem {
    type Id = CartItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A cart item enriched with the product name and the live stock of its
/// warehouse, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    pub product_name: String,
    pub available: i64,
}

/// Σ quantity × snapshotted unit price over a set of cart items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotal {
    pub item_count: usize,
    pub total_amount: Money,
}

impl CartTotal {
    pub fn of<'a>(items: impl IntoIterator<Item = &'a CartItem>) -> DomainResult<Self> {
        let mut item_count = 0;
        let mut total_amount = Money::ZERO;
        for item in items {
            total_amount = total_amount.checked_add(item.line_total()?)?;
            item_count += 1;
        }
        Ok(Self {
            item_count,
            total_amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: i64, cents: u64) -> CartItem {
        CartItem::new(
            UserId::new(),
            ProductId::new(),
            WarehouseId::new(),
            quantity,
            Money::from_cents(cents),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_positive_quantity() {
        for q in [0, -3] {
            let err = CartItem::new(
                UserId::new(),
                ProductId::new(),
                WarehouseId::new(),
                q,
                Money::from_cents(100),
                Utc::now(),
            )
            .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)));
        }
    }

    #[test]
    fn total_uses_snapshotted_prices() {
        let items = [item(3, 1000), item(1, 500)];
        let total = CartTotal::of(&items).unwrap();
        assert_eq!(total.item_count, 2);
        assert_eq!(total.total_amount, Money::from_cents(3500));
    }

    #[test]
    fn empty_cart_totals_zero() {
        let total = CartTotal::of(&[]).unwrap();
        assert_eq!(total.total_amount, Money::ZERO);
        assert_eq!(total.item_count, 0);
    }

    #[test]
    fn ownership() {
        let i = item(1, 1);
        assert!(i.belongs_to(i.user_id));
        assert!(!i.belongs_to(UserId::new()));
    }
}
