//! In-memory storage backend.
//!
//! A unit of work owns the whole state through a `tokio::sync::Mutex`, edits
//! a private copy, and publishes the copy on commit. Concurrent units of work
//! therefore run one after another, which is at least as strict as the row
//! locks the Postgres backend takes.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::instrument;

use storefront_cart::{CartItem, CartLine};
use storefront_core::{CartItemId, Entity, OrderId, PaymentId, ProductId, UserId, WarehouseId};
use storefront_inventory::StockEntry;
use storefront_products::{Product, Warehouse};
use storefront_sales::{Order, OrderFilter, OrderItem, OrderStatus, Payment, PaymentStatus};

use super::{
    CartStore, CatalogStore, InventoryLedger, OrderStore, PaymentRecord, PaymentStore, ShopStore,
    ShopTx, StoreError, StoreResult,
};

#[derive(Debug, Default, Clone)]
struct ShopState {
    products: BTreeMap<ProductId, Product>,
    warehouses: BTreeMap<WarehouseId, Warehouse>,
    stock: BTreeMap<(ProductId, WarehouseId), i64>,
    cart: BTreeMap<CartItemId, CartItem>,
    orders: BTreeMap<OrderId, Order>,
    order_items: Vec<OrderItem>,
    payments: BTreeMap<PaymentId, Payment>,
    /// order ↔ payment association.
    order_payment: HashMap<OrderId, PaymentId>,
}

impl ShopState {
    fn line(&self, item: &CartItem) -> Option<CartLine> {
        let product = self.products.get(&item.product_id)?;
        let available = self
            .stock
            .get(&(item.product_id, item.warehouse_id))
            .copied()
            .unwrap_or(0);
        Some(CartLine {
            item: item.clone(),
            product_name: product.name.clone(),
            available,
        })
    }

    fn lines<'a>(&self, items: impl Iterator<Item = &'a CartItem>) -> Vec<CartLine> {
        let mut lines: Vec<CartLine> = items.filter_map(|i| self.line(i)).collect();
        lines.sort_by_key(|l| (l.item.created_at, l.item.id));
        lines
    }

    fn record(&self, payment: &Payment) -> PaymentRecord {
        let order_id = self
            .order_payment
            .iter()
            .find(|(_, p)| **p == payment.id)
            .map(|(o, _)| *o);
        PaymentRecord {
            payment: payment.clone(),
            order_id,
        }
    }

    fn records<'a>(&self, payments: impl Iterator<Item = &'a Payment>) -> Vec<PaymentRecord> {
        let mut records: Vec<PaymentRecord> = payments.map(|p| self.record(p)).collect();
        records.sort_by(|a, b| {
            b.payment
                .created_at
                .cmp(&a.payment.created_at)
                .then_with(|| b.payment.id.cmp(&a.payment.id))
        });
        records
    }

    fn entries(&self, pred: impl Fn(&(ProductId, WarehouseId)) -> bool) -> Vec<StockEntry> {
        self.stock
            .iter()
            .filter(|(key, _)| pred(key))
            .map(|((product_id, warehouse_id), quantity)| StockEntry {
                product_id: *product_id,
                warehouse_id: *warehouse_id,
                quantity: *quantity,
            })
            .collect()
    }
}

/// Insert a record keyed by its id; an id already present is a duplicate.
fn insert_new<E>(table: &mut BTreeMap<E::Id, E>, entity: &E, kind: &str) -> StoreResult<()>
where
    E: Entity + Clone,
    E::Id: Ord + core::fmt::Display,
{
    if table.contains_key(entity.id()) {
        return Err(StoreError::Duplicate(format!("{kind} {}", entity.id())));
    }
    table.insert(entity.id().clone(), entity.clone());
    Ok(())
}

fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

/// In-memory [`ShopStore`].
#[derive(Debug, Clone)]
pub struct InMemoryShopStore {
    state: Arc<Mutex<ShopState>>,
    lock_timeout: Duration,
}

impl Default for InMemoryShopStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl InMemoryShopStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(ShopState::default())),
            lock_timeout,
        }
    }
}

#[async_trait]
impl ShopStore for InMemoryShopStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> StoreResult<Box<dyn ShopTx>> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                StoreError::LockTimeout(format!(
                    "could not acquire store lock within {}ms",
                    self.lock_timeout.as_millis()
                ))
            })?;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

struct InMemoryTx {
    guard: OwnedMutexGuard<ShopState>,
    working: ShopState,
}

#[async_trait]
impl ShopTx for InMemoryTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl InventoryLedger for InMemoryTx {
    async fn lock_stock(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Option<StockEntry>> {
        Ok(self
            .working
            .stock
            .get(&(product_id, warehouse_id))
            .map(|quantity| StockEntry {
                product_id,
                warehouse_id,
                quantity: *quantity,
            }))
    }

    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        amount: i64,
    ) -> StoreResult<StockEntry> {
        let quantity = self
            .working
            .stock
            .get_mut(&(product_id, warehouse_id))
            .ok_or_else(|| {
                StoreError::Invariant(format!(
                    "no stock row for product {product_id} in warehouse {warehouse_id}"
                ))
            })?;
        if amount > *quantity {
            return Err(StoreError::Invariant(format!(
                "stock for product {product_id} in warehouse {warehouse_id} would go negative"
            )));
        }
        *quantity -= amount;
        Ok(StockEntry {
            product_id,
            warehouse_id,
            quantity: *quantity,
        })
    }

    async fn upsert_stock(&mut self, entry: StockEntry) -> StoreResult<()> {
        if entry.quantity < 0 {
            return Err(StoreError::Invariant("stock quantity cannot be negative".to_string()));
        }
        if !self.working.products.contains_key(&entry.product_id)
            || !self.working.warehouses.contains_key(&entry.warehouse_id)
        {
            return Err(StoreError::Invariant(
                "stock row references unknown product or warehouse".to_string(),
            ));
        }
        self.working
            .stock
            .insert((entry.product_id, entry.warehouse_id), entry.quantity);
        Ok(())
    }

    async fn stock_for_product(&mut self, product_id: ProductId) -> StoreResult<Vec<StockEntry>> {
        Ok(self.working.entries(|(p, _)| *p == product_id))
    }

    async fn stock_for_warehouse(&mut self, warehouse_id: WarehouseId) -> StoreResult<Vec<StockEntry>> {
        Ok(self.working.entries(|(_, w)| *w == warehouse_id))
    }
}

#[async_trait]
impl CatalogStore for InMemoryTx {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        insert_new(&mut self.working.products, product, "product")
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool> {
        match self.working.products.get_mut(&product.id) {
            Some(stored) => {
                *stored = product.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_products(&mut self, limit: i64, offset: i64) -> StoreResult<Vec<Product>> {
        let skip = usize::try_from(offset).unwrap_or(0);
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self.working.products.values().skip(skip).take(take).cloned().collect())
    }

    async fn warehouse(&mut self, id: WarehouseId) -> StoreResult<Option<Warehouse>> {
        Ok(self.working.warehouses.get(&id).cloned())
    }

    async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> StoreResult<()> {
        insert_new(&mut self.working.warehouses, warehouse, "warehouse")
    }

    async fn list_warehouses(&mut self) -> StoreResult<Vec<Warehouse>> {
        Ok(self.working.warehouses.values().cloned().collect())
    }
}

#[async_trait]
impl CartStore for InMemoryTx {
    async fn cart_item(&mut self, id: CartItemId) -> StoreResult<Option<CartItem>> {
        Ok(self.working.cart.get(&id).cloned())
    }

    async fn cart_lines_by_ids(&mut self, ids: &[CartItemId], _lock: bool) -> StoreResult<Vec<CartLine>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.working.cart.get(id))
            .filter_map(|item| self.working.line(item))
            .collect())
    }

    async fn cart_lines_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<CartLine>> {
        Ok(self
            .working
            .lines(self.working.cart.values().filter(|i| i.user_id == user_id)))
    }

    async fn all_cart_lines(&mut self) -> StoreResult<Vec<CartLine>> {
        Ok(self.working.lines(self.working.cart.values()))
    }

    async fn find_cart_item(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Option<CartItem>> {
        Ok(self
            .working
            .cart
            .values()
            .find(|i| {
                i.user_id == user_id && i.product_id == product_id && i.warehouse_id == warehouse_id
            })
            .cloned())
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> StoreResult<()> {
        let clash = self.working.cart.values().any(|i| {
            i.user_id == item.user_id
                && i.product_id == item.product_id
                && i.warehouse_id == item.warehouse_id
        });
        if clash {
            return Err(StoreError::Duplicate(format!(
                "cart already holds product {} from warehouse {}",
                item.product_id, item.warehouse_id
            )));
        }
        insert_new(&mut self.working.cart, item, "cart item")
    }

    async fn update_cart_quantity(&mut self, id: CartItemId, quantity: i64) -> StoreResult<bool> {
        if quantity <= 0 {
            return Err(StoreError::Invariant("cart quantity must be positive".to_string()));
        }
        match self.working.cart.get_mut(&id) {
            Some(item) => {
                item.quantity = quantity;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> StoreResult<bool> {
        Ok(self.working.cart.remove(&id).is_some())
    }

    async fn clear_cart(&mut self, user_id: UserId) -> StoreResult<u64> {
        let before = self.working.cart.len();
        self.working.cart.retain(|_, i| i.user_id != user_id);
        Ok((before - self.working.cart.len()) as u64)
    }
}

#[async_trait]
impl OrderStore for InMemoryTx {
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        insert_new(&mut self.working.orders, order, "order")
    }

    async fn order(&mut self, id: OrderId, _lock: bool) -> StoreResult<Option<Order>> {
        Ok(self.working.orders.get(&id).cloned())
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn filter_orders(&mut self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .working
            .orders
            .values()
            .filter(|o| {
                let items: Vec<OrderItem> = self
                    .working
                    .order_items
                    .iter()
                    .filter(|i| i.order_id == o.id)
                    .cloned()
                    .collect();
                filter.matches(o, &items)
            })
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let order = self
            .working
            .orders
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("order {id} vanished")))?;
        order.status = status;
        order.updated_at = at;
        Ok(())
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()> {
        if !self.working.orders.contains_key(&item.order_id) {
            return Err(StoreError::Invariant(format!(
                "order item references unknown order {}",
                item.order_id
            )));
        }
        self.working.order_items.push(item.clone());
        Ok(())
    }

    async fn order_items(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
        Ok(self
            .working
            .order_items
            .iter()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentStore for InMemoryTx {
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        insert_new(&mut self.working.payments, payment, "payment")
    }

    async fn link_payment(
        &mut self,
        order_id: OrderId,
        payment_id: PaymentId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        if !self.working.payments.contains_key(&payment_id) {
            return Err(StoreError::Invariant(format!("unknown payment {payment_id}")));
        }
        let already_linked = self.working.order_payment.contains_key(&order_id)
            || self.working.order_payment.values().any(|p| *p == payment_id);
        if already_linked {
            return Err(StoreError::Duplicate(format!(
                "order {order_id} or payment {payment_id} is already linked"
            )));
        }
        let order = self
            .working
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Invariant(format!("unknown order {order_id}")))?;
        order.payment_id = Some(payment_id);
        order.updated_at = at;
        self.working.order_payment.insert(order_id, payment_id);
        Ok(())
    }

    async fn payment(&mut self, id: PaymentId, _lock: bool) -> StoreResult<Option<Payment>> {
        Ok(self.working.payments.get(&id).cloned())
    }

    async fn order_for_payment(&mut self, payment_id: PaymentId, _lock: bool) -> StoreResult<Option<Order>> {
        Ok(self
            .working
            .order_payment
            .iter()
            .find(|(_, p)| **p == payment_id)
            .and_then(|(o, _)| self.working.orders.get(o))
            .cloned())
    }

    async fn payments_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<PaymentRecord>> {
        Ok(self
            .working
            .records(self.working.payments.values().filter(|p| p.user_id == user_id)))
    }

    async fn list_payments(&mut self, status: Option<PaymentStatus>) -> StoreResult<Vec<PaymentRecord>> {
        Ok(self.working.records(
            self.working
                .payments
                .values()
                .filter(|p| status.is_none_or(|s| p.status == s)),
        ))
    }

    async fn set_payment_status(
        &mut self,
        id: PaymentId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let payment = self
            .working
            .payments
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("payment {id} vanished")))?;
        payment.status = status;
        payment.updated_at = at;
        Ok(())
    }
}
