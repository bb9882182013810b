//! Storage capability interface.
//!
//! Services never talk to a database directly. They open a unit of work with
//! [`ShopStore::begin`] and use the capability traits on the returned
//! [`ShopTx`]. Everything done through one `ShopTx` commits or rolls back
//! together; dropping it without `commit` rolls back.
//!
//! ## Locking
//!
//! [`InventoryLedger::lock_stock`] takes a row-exclusive lock on one
//! (product, warehouse) stock row that is held until the unit of work ends.
//! A caller that checks a quantity under that lock may decrement it later in
//! the same unit of work without re-reading. Waiting for a contended lock
//! longer than the configured timeout fails with [`StoreError::LockTimeout`].
//!
//! ## Backends
//!
//! - [`InMemoryShopStore`]: one async mutex over the whole state. Coarser than
//!   row locks, same serialization guarantee. Used by tests and local runs.
//! - [`PgShopStore`]: Postgres via sqlx, `SELECT ... FOR UPDATE` row locks.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use storefront_cart::{CartItem, CartLine};
use storefront_core::{CartItemId, OrderId, PaymentId, ProductId, UserId, WarehouseId};
use storefront_inventory::StockEntry;
use storefront_products::{Product, Warehouse};
use storefront_sales::{Order, OrderFilter, OrderItem, OrderStatus, Payment, PaymentStatus};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryShopStore;
pub use postgres::PgShopStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage failure.
///
/// These are infrastructure errors. Business outcomes (not found, not enough
/// stock) are expressed through return values, not through this enum.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Lock wait exceeded, deadlock detected, or serialization failure.
    #[error("lock timeout: {0}")]
    LockTimeout(String),

    /// A uniqueness constraint rejected the write.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A check or referential constraint rejected the write.
    #[error("constraint violated: {0}")]
    Invariant(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A payment together with the order it is linked to, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(flatten)]
    pub payment: Payment,
    pub order_id: Option<OrderId>,
}

#[async_trait]
pub trait InventoryLedger: Send {
    /// Read one stock row under a row-exclusive lock held until the unit of
    /// work ends. `None` when the row does not exist.
    async fn lock_stock(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Option<StockEntry>>;

    /// Subtract `amount`. The caller has already checked it under
    /// [`InventoryLedger::lock_stock`]; going below zero is rejected with
    /// [`StoreError::Invariant`], never clamped.
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        amount: i64,
    ) -> StoreResult<StockEntry>;

    /// Set the absolute quantity, creating the row if needed.
    async fn upsert_stock(&mut self, entry: StockEntry) -> StoreResult<()>;

    async fn stock_for_product(&mut self, product_id: ProductId) -> StoreResult<Vec<StockEntry>>;

    async fn stock_for_warehouse(&mut self, warehouse_id: WarehouseId) -> StoreResult<Vec<StockEntry>>;
}

#[async_trait]
pub trait CatalogStore: Send {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()>;

    /// Overwrite name, description and price. `false` when the product does
    /// not exist.
    async fn update_product(&mut self, product: &Product) -> StoreResult<bool>;

    /// Oldest first.
    async fn list_products(&mut self, limit: i64, offset: i64) -> StoreResult<Vec<Product>>;

    async fn warehouse(&mut self, id: WarehouseId) -> StoreResult<Option<Warehouse>>;

    async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> StoreResult<()>;

    async fn list_warehouses(&mut self) -> StoreResult<Vec<Warehouse>>;
}

#[async_trait]
pub trait CartStore: Send {
    async fn cart_item(&mut self, id: CartItemId) -> StoreResult<Option<CartItem>>;

    /// Enriched lines for the given ids, in the order requested. Unknown ids
    /// are skipped; the caller decides whether that is an error.
    ///
    /// `lock` takes row-exclusive locks on the cart rows (in id order) for the
    /// rest of the unit of work. A row deleted by the unit of work that held
    /// the lock before us is skipped.
    async fn cart_lines_by_ids(&mut self, ids: &[CartItemId], lock: bool) -> StoreResult<Vec<CartLine>>;

    async fn cart_lines_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<CartLine>>;

    async fn all_cart_lines(&mut self) -> StoreResult<Vec<CartLine>>;

    async fn find_cart_item(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Option<CartItem>>;

    /// Fails with [`StoreError::Duplicate`] if the user already has a line for
    /// the same (product, warehouse).
    async fn insert_cart_item(&mut self, item: &CartItem) -> StoreResult<()>;

    async fn update_cart_quantity(&mut self, id: CartItemId, quantity: i64) -> StoreResult<bool>;

    /// `false` when the row was already gone.
    async fn delete_cart_item(&mut self, id: CartItemId) -> StoreResult<bool>;

    async fn clear_cart(&mut self, user_id: UserId) -> StoreResult<u64>;
}

#[async_trait]
pub trait OrderStore: Send {
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;

    /// `lock` takes a row-exclusive lock for the rest of the unit of work.
    async fn order(&mut self, id: OrderId, lock: bool) -> StoreResult<Option<Order>>;

    /// Newest first.
    async fn orders_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<Order>>;

    /// Newest first. An empty filter lists every order.
    async fn filter_orders(&mut self, filter: &OrderFilter) -> StoreResult<Vec<Order>>;

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()>;

    async fn order_items(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderItem>>;
}

#[async_trait]
pub trait PaymentStore: Send {
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    /// Record the order ↔ payment association and set `orders.payment_id`.
    /// A second link for either side fails with [`StoreError::Duplicate`].
    async fn link_payment(
        &mut self,
        order_id: OrderId,
        payment_id: PaymentId,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// `lock` takes a row-exclusive lock for the rest of the unit of work.
    async fn payment(&mut self, id: PaymentId, lock: bool) -> StoreResult<Option<Payment>>;

    /// The order linked to a payment, optionally locked.
    async fn order_for_payment(&mut self, payment_id: PaymentId, lock: bool) -> StoreResult<Option<Order>>;

    /// Newest first.
    async fn payments_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<PaymentRecord>>;

    /// Newest first, optionally restricted to one status.
    async fn list_payments(&mut self, status: Option<PaymentStatus>) -> StoreResult<Vec<PaymentRecord>>;

    async fn set_payment_status(
        &mut self,
        id: PaymentId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// One unit of work spanning every capability.
#[async_trait]
pub trait ShopTx: InventoryLedger + CatalogStore + CartStore + OrderStore + PaymentStore + Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Opens units of work.
#[async_trait]
pub trait ShopStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn ShopTx>>;
}

#[async_trait]
impl<S> ShopStore for Arc<S>
where
    S: ShopStore + ?Sized,
{
    async fn begin(&self) -> StoreResult<Box<dyn ShopTx>> {
        (**self).begin().await
    }
}
