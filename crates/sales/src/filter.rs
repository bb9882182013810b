use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storefront_core::{DomainError, DomainResult, Money, WarehouseId};

use crate::{Order, OrderItem, OrderStatus};

/// Admin order search. Every field is optional; absent fields match all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    #[serde(default)]
    pub statuses: Vec<OrderStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub min_amount: Option<Money>,
    pub max_amount: Option<Money>,
    /// Orders with at least one item shipped from this warehouse.
    pub warehouse_id: Option<WarehouseId>,
}

impl OrderFilter {
    pub fn validate(&self) -> DomainResult<()> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(DomainError::validation("'from' must not be after 'to'"));
            }
        }
        if let (Some(min), Some(max)) = (self.min_amount, self.max_amount) {
            if min > max {
                return Err(DomainError::validation("min_amount must not exceed max_amount"));
            }
        }
        Ok(())
    }

    /// Evaluate against an order and its items (for backends without a query engine).
    pub fn matches(&self, order: &Order, items: &[OrderItem]) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&order.status))
            && self.from.is_none_or(|from| order.created_at >= from)
            && self.to.is_none_or(|to| order.created_at <= to)
            && self.min_amount.is_none_or(|min| order.total_amount >= min)
            && self.max_amount.is_none_or(|max| order.total_amount <= max)
            && self
                .warehouse_id
                .is_none_or(|wh| items.iter().any(|i| i.warehouse_id == wh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storefront_core::{OrderId, UserId};

    use crate::{OrderLineInput, ShippingAddress};

    fn order(cents: u64) -> Order {
        Order::pending(
            UserId::new(),
            Money::from_cents(cents),
            ShippingAddress::parse("addr").unwrap(),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(OrderFilter::default().matches(&order(100), &[]));
    }

    #[test]
    fn amount_and_status_bounds() {
        let o = order(5_000);
        let f = OrderFilter {
            statuses: vec![OrderStatus::Pending],
            min_amount: Some(Money::from_cents(1_000)),
            max_amount: Some(Money::from_cents(4_999)),
            ..OrderFilter::default()
        };
        assert!(!f.matches(&o, &[]));

        let f = OrderFilter {
            max_amount: Some(Money::from_cents(5_000)),
            ..f
        };
        assert!(f.matches(&o, &[]));
    }

    #[test]
    fn warehouse_filter_looks_at_items() {
        let o = order(100);
        let wh = WarehouseId::new();
        let item = OrderItem::snapshot(
            OrderId::new(),
            &OrderLineInput {
                product_id: storefront_core::ProductId::new(),
                warehouse_id: wh,
                quantity: 1,
                unit_price: Money::from_cents(100),
            },
        );
        let f = OrderFilter {
            warehouse_id: Some(wh),
            ..OrderFilter::default()
        };
        assert!(f.matches(&o, &[item]));
        assert!(!f.matches(&o, &[]));
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let now = Utc::now();
        let f = OrderFilter {
            from: Some(now),
            to: Some(now - Duration::days(1)),
            ..OrderFilter::default()
        };
        assert!(f.validate().is_err());
    }
}
