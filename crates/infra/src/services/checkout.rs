//! Checkout orchestration.
//!
//! Converts selected cart lines into one order, one payment, order items and
//! stock decrements inside a single unit of work:
//!
//! ```text
//! Started → Validated → StockLocked → TotalComputed → OrderCreated
//!   → PaymentCreated → ItemsWritten → StockDeducted → CartCleared → Committed
//! ```
//!
//! Any error moves to `Aborted` and rolls the unit of work back, so no order,
//! payment, stock change or cart deletion survives a failed checkout.
//!
//! The stock rows locked in `StockLocked` are decremented in `StockDeducted`
//! on the same unit of work. They are never released and re-read in between.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use storefront_cart::CartLine;
use storefront_core::{CartItemId, Money, OrderId, PaymentId, ProductId, UserId, WarehouseId};
use storefront_inventory::StockEntry;
use storefront_sales::{
    Order, OrderItem, OrderLineInput, OrderStatus, Payment, PaymentMethod, PaymentStatus,
    ShippingAddress, order_total,
};

use crate::config::{SettlementMode, ShopConfig};
use crate::error::{ShopError, ShopResult};
use crate::store::{ShopStore, ShopTx};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Missing and empty both fail validation.
    #[serde(default)]
    pub cart_item_ids: Vec<CartItemId>,
    #[serde(default)]
    pub shipping_address: String,
    /// Defaults to the configured method (normally `card`).
    #[serde(default)]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub cart_item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub total_amount: Money,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub shipping_address: String,
    pub items: Vec<ReceiptLine>,
}

/// Progress marker, logged when a checkout aborts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutStage {
    Started,
    Validated,
    StockLocked,
    TotalComputed,
    OrderCreated,
    PaymentCreated,
    ItemsWritten,
    StockDeducted,
    CartCleared,
    Committed,
    Aborted,
}

#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn ShopStore>,
    config: ShopConfig,
}

impl CheckoutService {
    pub fn new(store: Arc<dyn ShopStore>, config: ShopConfig) -> Self {
        Self { store, config }
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, items = request.cart_item_ids.len()))]
    pub async fn checkout(&self, user_id: UserId, request: CheckoutRequest) -> ShopResult<CheckoutReceipt> {
        let mut stage = CheckoutStage::Started;
        let mut tx = self.store.begin().await?;

        let result = self.run(&mut *tx, user_id, request, &mut stage).await;
        let result = match result {
            Ok(receipt) => tx.commit().await.map(|_| receipt).map_err(ShopError::from),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        };

        match result {
            Ok(receipt) => {
                stage = CheckoutStage::Committed;
                info!(
                    ?stage,
                    order_id = %receipt.order_id,
                    payment_id = %receipt.payment_id,
                    total = %receipt.total_amount,
                    "checkout committed"
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(failed_after = ?stage, stage = ?CheckoutStage::Aborted, error = %err, "checkout aborted");
                Err(err)
            }
        }
    }

    async fn run(
        &self,
        tx: &mut dyn ShopTx,
        user_id: UserId,
        request: CheckoutRequest,
        stage: &mut CheckoutStage,
    ) -> ShopResult<CheckoutReceipt> {
        // Started → Validated
        let ids = dedupe(&request.cart_item_ids);
        if ids.is_empty() {
            return Err(ShopError::validation("no cart items selected"));
        }
        let address = ShippingAddress::parse(&request.shipping_address)?;
        let method = match request.payment_method.as_deref() {
            Some(raw) => PaymentMethod::parse(raw)?,
            None => self.config.default_payment_method.clone(),
        };
        let lines = load_owned_lines(tx, user_id, &ids).await?;
        *stage = CheckoutStage::Validated;

        // Validated → StockLocked
        let mut locked: Vec<StockEntry> = Vec::with_capacity(lines.len());
        for line in &lines {
            let item = &line.item;
            let entry = tx
                .lock_stock(item.product_id, item.warehouse_id)
                .await?
                .unwrap_or_else(|| StockEntry::absent(item.product_id, item.warehouse_id));
            entry
                .check(&line.product_name, item.quantity)
                .map_err(ShopError::InsufficientStock)?;
            locked.push(entry);
        }
        *stage = CheckoutStage::StockLocked;

        // StockLocked → TotalComputed, on snapshotted cart prices
        let inputs: Vec<OrderLineInput> = lines
            .iter()
            .map(|line| OrderLineInput {
                product_id: line.item.product_id,
                warehouse_id: line.item.warehouse_id,
                quantity: line.item.quantity,
                unit_price: line.item.unit_price,
            })
            .collect();
        let total = order_total(&inputs)?;
        *stage = CheckoutStage::TotalComputed;

        // TotalComputed → OrderCreated
        let now = Utc::now();
        let mut order = Order::pending(user_id, total, address, now)?;
        tx.insert_order(&order).await?;
        *stage = CheckoutStage::OrderCreated;

        // OrderCreated → PaymentCreated
        let mut payment = Payment::pending(user_id, total, method, now)?;
        tx.insert_payment(&payment).await?;
        order.attach_payment(payment.id, now)?;
        tx.link_payment(order.id, payment.id, now).await?;
        *stage = CheckoutStage::PaymentCreated;

        // PaymentCreated → ItemsWritten
        for input in &inputs {
            tx.insert_order_item(&OrderItem::snapshot(order.id, input)).await?;
        }
        *stage = CheckoutStage::ItemsWritten;

        // ItemsWritten → StockDeducted, against the rows locked above
        for (entry, line) in locked.into_iter().zip(&lines) {
            let expected = entry.deduct(line.item.quantity)?;
            let stored = tx
                .decrement_stock(expected.product_id, expected.warehouse_id, line.item.quantity)
                .await?;
            if stored.quantity != expected.quantity {
                return Err(ShopError::Internal(format!(
                    "stock for product {} in warehouse {} changed under lock",
                    expected.product_id, expected.warehouse_id
                )));
            }
        }
        *stage = CheckoutStage::StockDeducted;

        // StockDeducted → CartCleared
        for line in &lines {
            if !tx.delete_cart_item(line.item.id).await? {
                return Err(ShopError::Conflict(format!(
                    "cart item {} was consumed by a concurrent checkout",
                    line.item.id
                )));
            }
        }
        *stage = CheckoutStage::CartCleared;

        if self.config.settlement == SettlementMode::Immediate {
            let now = Utc::now();
            payment.transition(PaymentStatus::Completed, now)?;
            order.transition(OrderStatus::Confirmed, now)?;
            tx.set_payment_status(payment.id, payment.status, now).await?;
            tx.set_order_status(order.id, order.status, now).await?;
        }

        let items = lines
            .iter()
            .map(|line| {
                Ok(ReceiptLine {
                    cart_item_id: line.item.id,
                    product_id: line.item.product_id,
                    product_name: line.product_name.clone(),
                    warehouse_id: line.item.warehouse_id,
                    quantity: line.item.quantity,
                    unit_price: line.item.unit_price,
                    line_total: line.item.line_total()?,
                })
            })
            .collect::<ShopResult<Vec<_>>>()?;

        Ok(CheckoutReceipt {
            order_id: order.id,
            payment_id: payment.id,
            total_amount: order.total_amount,
            order_status: order.status,
            payment_status: payment.status,
            payment_method: payment.method,
            shipping_address: order.shipping_address.as_str().to_string(),
            items,
        })
    }
}

/// Collapse repeated ids, keeping first-occurrence order.
fn dedupe(ids: &[CartItemId]) -> Vec<CartItemId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Lock and resolve every id to a line owned by `user_id`. One missing or
/// foreign id fails the whole request. A line another checkout consumed while
/// we waited for its lock counts as missing.
async fn load_owned_lines(
    tx: &mut dyn ShopTx,
    user_id: UserId,
    ids: &[CartItemId],
) -> ShopResult<Vec<CartLine>> {
    let lines = tx.cart_lines_by_ids(ids, true).await?;
    if lines.len() != ids.len() {
        let found: HashSet<CartItemId> = lines.iter().map(|l| l.item.id).collect();
        if let Some(missing) = ids.iter().find(|id| !found.contains(id)) {
            return Err(ShopError::not_found("cart item", missing));
        }
    }
    if let Some(foreign) = lines.iter().find(|l| !l.item.belongs_to(user_id)) {
        return Err(ShopError::Ownership(format!(
            "cart item {} does not belong to the requesting user",
            foreign.item.id
        )));
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedupe_keeps_first_occurrence_order() {
        let a = CartItemId::new();
        let b = CartItemId::new();
        let c = CartItemId::new();
        assert_eq!(dedupe(&[b, a, b, c, a]), vec![b, a, c]);
    }

    #[test]
    fn payment_method_is_optional_in_requests() {
        let id = CartItemId::new();
        let raw = format!(r#"{{"cart_item_ids":["{id}"],"shipping_address":"1 Main St"}}"#);
        let request: CheckoutRequest = serde_json::from_str(&raw).unwrap();
        assert_eq!(request.cart_item_ids, vec![id]);
        assert!(request.payment_method.is_none());
    }

    #[test]
    fn missing_fields_deserialize_empty_for_validation() {
        let request: CheckoutRequest = serde_json::from_str(r#"{"cart_item_ids":[]}"#).unwrap();
        assert!(request.shipping_address.is_empty());
        let request: CheckoutRequest = serde_json::from_str(r#"{"shipping_address":"1 Main St"}"#).unwrap();
        assert!(request.cart_item_ids.is_empty());
    }
}
