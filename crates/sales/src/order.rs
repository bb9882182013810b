use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{
    DomainError, DomainResult, Entity, Money, OrderId, OrderItemId, PaymentId, ProductId, UserId,
    WarehouseId,
};

/// Order status lifecycle.
///
/// ```text
/// pending ──► confirmed ──► cancelled
///    │
///    ├──────► payment_failed
///    └──────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    PaymentFailed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, PaymentFailed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "payment_failed" => Ok(OrderStatus::PaymentFailed),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(DomainError::validation(format!("unknown order status '{other}'"))),
        }
    }
}

/// Non-empty, trimmed delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShippingAddress(String);

impl ShippingAddress {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("shipping address is required"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Order header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub shipping_address: ShippingAddress,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// New order in `pending` with no payment attached yet.
    pub fn pending(
        user_id: UserId,
        total_amount: Money,
        shipping_address: ShippingAddress,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if total_amount == Money::ZERO {
            return Err(DomainError::validation("order total must be greater than zero"));
        }
        Ok(Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Pending,
            total_amount,
            shipping_address,
            payment_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// An order carries at most one payment.
    pub fn attach_payment(&mut self, payment_id: PaymentId, now: DateTime<Utc>) -> DomainResult<()> {
        match self.payment_id {
            Some(existing) if existing != payment_id => Err(DomainError::invariant(format!(
                "order {} already has payment {}",
                self.id, existing
            ))),
            _ => {
                self.payment_id = Some(payment_id);
                self.updated_at = now;
                Ok(())
            }
        }
    }

    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::illegal_transition("order", self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// What checkout knows about one line when it builds the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineInput {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub unit_price: Money,
}

/// Σ quantity × unit_price, checked.
pub fn order_total<'a>(lines: impl IntoIterator<Item = &'a OrderLineInput>) -> DomainResult<Money> {
    lines.into_iter().try_fold(Money::ZERO, |acc, line| {
        if line.quantity <= 0 {
            return Err(DomainError::validation("line quantity must be greater than zero"));
        }
        acc.checked_add(line.unit_price.times(line.quantity)?)
    })
}

/// Immutable purchase-time snapshot of one cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub price: Money,
    pub warehouse_id: WarehouseId,
}

impl OrderItem {
    pub fn snapshot(order_id: OrderId, line: &OrderLineInput) -> Self {
        Self {
            id: OrderItemId::new(),
            order_id,
            product_id: line.product_id,
            quantity: line.quantity,
            price: line.unit_price,
            warehouse_id: line.warehouse_id,
        }
    }

    pub fn line_total(&self) -> DomainResult<Money> {
        self.price.times(self.quantity)
    }
}
