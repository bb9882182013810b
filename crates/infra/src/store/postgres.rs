//! Postgres storage backend.
//!
//! One [`PgShopTx`] wraps one sqlx transaction on one pooled connection, so a
//! row locked with `SELECT ... FOR UPDATE` stays locked until commit or
//! rollback. Every transaction sets `lock_timeout` so a contended row fails
//! fast instead of queueing forever.
//!
//! Checkout locks its cart rows (in id order) before the stock rows. A second
//! checkout of the same cart item waits on the cart row and, once the first
//! commits, no longer sees it.
//!
//! ## Error Mapping
//!
//! | SQLSTATE | Meaning | StoreError |
//! |----------|---------|------------|
//! | `55P03` | lock_not_available (lock_timeout hit) | `LockTimeout` |
//! | `40P01` | deadlock_detected | `LockTimeout` |
//! | `40001` | serialization_failure | `LockTimeout` |
//! | `23505` | unique_violation | `Duplicate` |
//! | `23514` | check_violation (e.g. `quantity >= 0`) | `Invariant` |
//! | `23503` | foreign_key_violation | `Invariant` |
//! | other | | `Backend` |

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use storefront_cart::{CartItem, CartLine};
use storefront_core::{
    CartItemId, Money, OrderId, OrderItemId, PaymentId, ProductId, UserId, WarehouseId,
};
use storefront_inventory::StockEntry;
use storefront_products::{Product, Warehouse};
use storefront_sales::{
    Order, OrderFilter, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentStatus,
    ShippingAddress,
};

use super::{
    CartStore, CatalogStore, InventoryLedger, OrderStore, PaymentRecord, PaymentStore, ShopStore,
    ShopTx, StoreError, StoreResult,
};

const SCHEMA: &str = include_str!("schema.sql");

const CART_LINE_SELECT: &str = r#"
    SELECT
        c.id, c.user_id, c.product_id, c.warehouse_id, c.quantity, c.price, c.created_at,
        p.name AS product_name,
        COALESCE(ws.quantity, 0) AS available
    FROM cart c
    JOIN products p ON p.id = c.product_id
    LEFT JOIN warehouse_stock ws
        ON ws.product_id = c.product_id
       AND ws.warehouse_id = c.warehouse_id
"#;

const PAYMENT_RECORD_SELECT: &str = r#"
    SELECT
        p.id, p.user_id, p.amount, p.method, p.status, p.created_at, p.updated_at,
        op.order_id
    FROM payments p
    LEFT JOIN order_payment op ON op.payment_id = p.id
"#;

/// Postgres-backed [`ShopStore`].
#[derive(Debug, Clone)]
pub struct PgShopStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgShopStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout: Duration,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, lock_timeout))
    }

    /// Create tables and indexes if they are missing.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ShopStore for PgShopStore {
    #[instrument(skip(self), err)]
    async fn begin(&self) -> StoreResult<Box<dyn ShopTx>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET does not take bind parameters; the value is an integer we format.
        let stmt = format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis());
        sqlx::query(&stmt)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        Ok(Box::new(PgShopTx { tx }))
    }
}

pub struct PgShopTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ShopTx for PgShopTx {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl InventoryLedger for PgShopTx {
    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id), err)]
    async fn lock_stock(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Option<StockEntry>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity
            FROM warehouse_stock
            WHERE product_id = $1 AND warehouse_id = $2
            FOR UPDATE
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_stock", e))?;

        row.as_ref().map(stock_from_row).transpose()
    }

    #[instrument(skip(self), fields(product_id = %product_id, warehouse_id = %warehouse_id), err)]
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        amount: i64,
    ) -> StoreResult<StockEntry> {
        let row = sqlx::query(
            r#"
            UPDATE warehouse_stock
            SET quantity = quantity - $3, updated_at = NOW()
            WHERE product_id = $1 AND warehouse_id = $2
            RETURNING product_id, warehouse_id, quantity
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .bind(amount)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        match row {
            Some(row) => stock_from_row(&row),
            None => Err(StoreError::Invariant(format!(
                "no stock row for product {product_id} in warehouse {warehouse_id}"
            ))),
        }
    }

    async fn upsert_stock(&mut self, entry: StockEntry) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO warehouse_stock (product_id, warehouse_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, warehouse_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            "#,
        )
        .bind(entry.product_id.as_uuid())
        .bind(entry.warehouse_id.as_uuid())
        .bind(entry.quantity)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_stock", e))?;
        Ok(())
    }

    async fn stock_for_product(&mut self, product_id: ProductId) -> StoreResult<Vec<StockEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity
            FROM warehouse_stock
            WHERE product_id = $1
            ORDER BY warehouse_id
            "#,
        )
        .bind(product_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("stock_for_product", e))?;

        rows.iter().map(stock_from_row).collect()
    }

    async fn stock_for_warehouse(&mut self, warehouse_id: WarehouseId) -> StoreResult<Vec<StockEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT product_id, warehouse_id, quantity
            FROM warehouse_stock
            WHERE warehouse_id = $1
            ORDER BY product_id
            "#,
        )
        .bind(warehouse_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("stock_for_warehouse", e))?;

        rows.iter().map(stock_from_row).collect()
    }
}

#[async_trait]
impl CatalogStore for PgShopTx {
    async fn product(&mut self, id: ProductId) -> StoreResult<Option<Product>> {
        let row = sqlx::query(
            "SELECT id, name, description, price, created_at FROM products WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, description, price, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(to_cents(product.price)?)
        .bind(product.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4 WHERE id = $1",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.description)
        .bind(to_cents(product.price)?)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_products(&mut self, limit: i64, offset: i64) -> StoreResult<Vec<Product>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, price, created_at
            FROM products
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn warehouse(&mut self, id: WarehouseId) -> StoreResult<Option<Warehouse>> {
        let row = sqlx::query("SELECT id, name, location, created_at FROM warehouses WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("warehouse", e))?;

        row.as_ref().map(warehouse_from_row).transpose()
    }

    async fn insert_warehouse(&mut self, warehouse: &Warehouse) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO warehouses (id, name, location, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(warehouse.id.as_uuid())
        .bind(&warehouse.name)
        .bind(&warehouse.location)
        .bind(warehouse.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_warehouse", e))?;
        Ok(())
    }

    async fn list_warehouses(&mut self) -> StoreResult<Vec<Warehouse>> {
        let rows = sqlx::query("SELECT id, name, location, created_at FROM warehouses ORDER BY id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_warehouses", e))?;

        rows.iter().map(warehouse_from_row).collect()
    }
}

#[async_trait]
impl CartStore for PgShopTx {
    async fn cart_item(&mut self, id: CartItemId) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, product_id, warehouse_id, quantity, price, created_at
            FROM cart
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("cart_item", e))?;

        row.as_ref().map(cart_item_from_row).transpose()
    }

    async fn cart_lines_by_ids(&mut self, ids: &[CartItemId], lock: bool) -> StoreResult<Vec<CartLine>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let stmt = if lock {
            format!("{CART_LINE_SELECT} WHERE c.id = ANY($1) ORDER BY c.id FOR UPDATE OF c")
        } else {
            format!("{CART_LINE_SELECT} WHERE c.id = ANY($1)")
        };
        let rows = sqlx::query(&stmt)
            .bind(uuids)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("cart_lines_by_ids", e))?;

        let mut by_id: HashMap<CartItemId, CartLine> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let line = cart_line_from_row(row)?;
            by_id.insert(line.item.id, line);
        }
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn cart_lines_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<CartLine>> {
        let stmt = format!("{CART_LINE_SELECT} WHERE c.user_id = $1 ORDER BY c.created_at, c.id");
        let rows = sqlx::query(&stmt)
            .bind(user_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("cart_lines_for_user", e))?;

        rows.iter().map(cart_line_from_row).collect()
    }

    async fn all_cart_lines(&mut self) -> StoreResult<Vec<CartLine>> {
        let stmt = format!("{CART_LINE_SELECT} ORDER BY c.created_at, c.id");
        let rows = sqlx::query(&stmt)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("all_cart_lines", e))?;

        rows.iter().map(cart_line_from_row).collect()
    }

    async fn find_cart_item(
        &mut self,
        user_id: UserId,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> StoreResult<Option<CartItem>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, product_id, warehouse_id, quantity, price, created_at
            FROM cart
            WHERE user_id = $1 AND product_id = $2 AND warehouse_id = $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid())
        .bind(warehouse_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("find_cart_item", e))?;

        row.as_ref().map(cart_item_from_row).transpose()
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cart (id, user_id, product_id, warehouse_id, quantity, price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.user_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(item.warehouse_id.as_uuid())
        .bind(item.quantity)
        .bind(to_cents(item.unit_price)?)
        .bind(item.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_cart_item", e))?;
        Ok(())
    }

    async fn update_cart_quantity(&mut self, id: CartItemId, quantity: i64) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE cart SET quantity = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("update_cart_quantity", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_cart_item(&mut self, id: CartItemId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM cart WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_cart_item", e))?;
        Ok(result.rows_affected() == 1)
    }

    async fn clear_cart(&mut self, user_id: UserId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("clear_cart", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderStore for PgShopTx {
    async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, status, total_amount, shipping_address, payment_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(to_cents(order.total_amount)?)
        .bind(order.shipping_address.as_str())
        .bind(order.payment_id.map(Uuid::from))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        Ok(())
    }

    async fn order(&mut self, id: OrderId, lock: bool) -> StoreResult<Option<Order>> {
        let stmt = if lock {
            "SELECT * FROM orders WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT * FROM orders WHERE id = $1"
        };
        let row = sqlx::query(stmt)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order", e))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn orders_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("orders_for_user", e))?;

        rows.iter().map(order_from_row).collect()
    }

    async fn filter_orders(&mut self, filter: &OrderFilter) -> StoreResult<Vec<Order>> {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
        let min = filter.min_amount.map(to_cents).transpose()?;
        let max = filter.max_amount.map(to_cents).transpose()?;

        let rows = sqlx::query(
            r#"
            SELECT o.*
            FROM orders o
            WHERE (cardinality($1::text[]) = 0 OR o.status = ANY($1))
              AND ($2::timestamptz IS NULL OR o.created_at >= $2)
              AND ($3::timestamptz IS NULL OR o.created_at <= $3)
              AND ($4::bigint IS NULL OR o.total_amount >= $4)
              AND ($5::bigint IS NULL OR o.total_amount <= $5)
              AND ($6::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM order_items oi
                    WHERE oi.order_id = o.id AND oi.warehouse_id = $6
                  ))
            ORDER BY o.created_at DESC, o.id DESC
            "#,
        )
        .bind(statuses)
        .bind(filter.from)
        .bind(filter.to)
        .bind(min)
        .bind(max)
        .bind(filter.warehouse_id.map(Uuid::from))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("filter_orders", e))?;

        rows.iter().map(order_from_row).collect()
    }

    async fn set_order_status(
        &mut self,
        id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_order_status", e))?;
        expect_one_row(result.rows_affected(), "order", id)
    }

    async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price, warehouse_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(item.order_id.as_uuid())
        .bind(item.product_id.as_uuid())
        .bind(item.quantity)
        .bind(to_cents(item.price)?)
        .bind(item.warehouse_id.as_uuid())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order_item", e))?;
        Ok(())
    }

    async fn order_items(&mut self, order_id: OrderId) -> StoreResult<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, product_id, quantity, price, warehouse_id
            FROM order_items
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("order_items", e))?;

        rows.iter().map(order_item_from_row).collect()
    }
}

#[async_trait]
impl PaymentStore for PgShopTx {
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, user_id, amount, method, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(to_cents(payment.amount)?)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_payment", e))?;
        Ok(())
    }

    async fn link_payment(
        &mut self,
        order_id: OrderId,
        payment_id: PaymentId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("INSERT INTO order_payment (order_id, payment_id, created_at) VALUES ($1, $2, $3)")
            .bind(order_id.as_uuid())
            .bind(payment_id.as_uuid())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("link_payment", e))?;

        let result = sqlx::query("UPDATE orders SET payment_id = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(payment_id.as_uuid())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("link_payment", e))?;
        expect_one_row(result.rows_affected(), "order", order_id)
    }

    async fn payment(&mut self, id: PaymentId, lock: bool) -> StoreResult<Option<Payment>> {
        let stmt = if lock {
            "SELECT * FROM payments WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT * FROM payments WHERE id = $1"
        };
        let row = sqlx::query(stmt)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("payment", e))?;

        row.as_ref().map(payment_from_row).transpose()
    }

    async fn order_for_payment(&mut self, payment_id: PaymentId, lock: bool) -> StoreResult<Option<Order>> {
        let stmt = if lock {
            r#"
            SELECT o.* FROM orders o
            JOIN order_payment op ON op.order_id = o.id
            WHERE op.payment_id = $1
            FOR UPDATE OF o
            "#
        } else {
            r#"
            SELECT o.* FROM orders o
            JOIN order_payment op ON op.order_id = o.id
            WHERE op.payment_id = $1
            "#
        };
        let row = sqlx::query(stmt)
            .bind(payment_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("order_for_payment", e))?;

        row.as_ref().map(order_from_row).transpose()
    }

    async fn payments_for_user(&mut self, user_id: UserId) -> StoreResult<Vec<PaymentRecord>> {
        let stmt = format!("{PAYMENT_RECORD_SELECT} WHERE p.user_id = $1 ORDER BY p.created_at DESC, p.id DESC");
        let rows = sqlx::query(&stmt)
            .bind(user_id.as_uuid())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("payments_for_user", e))?;

        rows.iter().map(payment_record_from_row).collect()
    }

    async fn list_payments(&mut self, status: Option<PaymentStatus>) -> StoreResult<Vec<PaymentRecord>> {
        let stmt = format!(
            "{PAYMENT_RECORD_SELECT} WHERE ($1::text IS NULL OR p.status = $1) ORDER BY p.created_at DESC, p.id DESC"
        );
        let rows = sqlx::query(&stmt)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_payments", e))?;

        rows.iter().map(payment_record_from_row).collect()
    }

    async fn set_payment_status(
        &mut self,
        id: PaymentId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE payments SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_payment_status", e))?;
        expect_one_row(result.rows_affected(), "payment", id)
    }
}

// Row decoding

fn col<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn money(cents: i64, column: &str) -> StoreResult<Money> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| StoreError::Backend(format!("negative amount in column {column}")))
}

fn to_cents(amount: Money) -> StoreResult<i64> {
    i64::try_from(amount.cents())
        .map_err(|_| StoreError::Invariant(format!("amount {amount} exceeds storage range")))
}

fn backend(e: impl core::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn expect_one_row(affected: u64, entity: &str, id: impl core::fmt::Display) -> StoreResult<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(StoreError::Backend(format!("{entity} {id} vanished mid-transaction")))
    }
}

fn stock_from_row(row: &PgRow) -> StoreResult<StockEntry> {
    Ok(StockEntry {
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        warehouse_id: WarehouseId::from_uuid(col(row, "warehouse_id")?),
        quantity: col(row, "quantity")?,
    })
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    Ok(Product {
        id: ProductId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        description: col(row, "description")?,
        price: money(col(row, "price")?, "price")?,
        created_at: col(row, "created_at")?,
    })
}

fn warehouse_from_row(row: &PgRow) -> StoreResult<Warehouse> {
    Ok(Warehouse {
        id: WarehouseId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        location: col(row, "location")?,
        created_at: col(row, "created_at")?,
    })
}

fn cart_item_from_row(row: &PgRow) -> StoreResult<CartItem> {
    Ok(CartItem {
        id: CartItemId::from_uuid(col(row, "id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        warehouse_id: WarehouseId::from_uuid(col(row, "warehouse_id")?),
        quantity: col(row, "quantity")?,
        unit_price: money(col(row, "price")?, "price")?,
        created_at: col(row, "created_at")?,
    })
}

fn cart_line_from_row(row: &PgRow) -> StoreResult<CartLine> {
    Ok(CartLine {
        item: cart_item_from_row(row)?,
        product_name: col(row, "product_name")?,
        available: col(row, "available")?,
    })
}

fn order_from_row(row: &PgRow) -> StoreResult<Order> {
    let status: String = col(row, "status")?;
    let address: String = col(row, "shipping_address")?;
    let payment_id: Option<Uuid> = col(row, "payment_id")?;
    Ok(Order {
        id: OrderId::from_uuid(col(row, "id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        status: status.parse::<OrderStatus>().map_err(backend)?,
        total_amount: money(col(row, "total_amount")?, "total_amount")?,
        shipping_address: ShippingAddress::parse(&address).map_err(backend)?,
        payment_id: payment_id.map(PaymentId::from_uuid),
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn order_item_from_row(row: &PgRow) -> StoreResult<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(col(row, "id")?),
        order_id: OrderId::from_uuid(col(row, "order_id")?),
        product_id: ProductId::from_uuid(col(row, "product_id")?),
        quantity: col(row, "quantity")?,
        price: money(col(row, "price")?, "price")?,
        warehouse_id: WarehouseId::from_uuid(col(row, "warehouse_id")?),
    })
}

fn payment_from_row(row: &PgRow) -> StoreResult<Payment> {
    let status: String = col(row, "status")?;
    let method: String = col(row, "method")?;
    Ok(Payment {
        id: PaymentId::from_uuid(col(row, "id")?),
        user_id: UserId::from_uuid(col(row, "user_id")?),
        amount: money(col(row, "amount")?, "amount")?,
        method: PaymentMethod::parse(&method).map_err(backend)?,
        status: status.parse::<PaymentStatus>().map_err(backend)?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
    })
}

fn payment_record_from_row(row: &PgRow) -> StoreResult<PaymentRecord> {
    let order_id: Option<Uuid> = col(row, "order_id")?;
    Ok(PaymentRecord {
        payment: payment_from_row(row)?,
        order_id: order_id.map(OrderId::from_uuid),
    })
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("55P03") | Some("40P01") | Some("40001") => StoreError::LockTimeout(msg),
                Some("23505") => StoreError::Duplicate(msg),
                Some("23514") | Some("23503") => StoreError::Invariant(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::LockTimeout(format!("connection pool exhausted in {}", operation))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cents_round_trip_through_bigint() {
        let amount = Money::from_cents(3_500);
        assert_eq!(money(to_cents(amount).unwrap(), "amount").unwrap(), amount);
    }

    #[test]
    fn negative_stored_amount_is_a_backend_error() {
        assert!(matches!(money(-1, "amount"), Err(StoreError::Backend(_))));
    }

    #[test]
    fn amounts_beyond_bigint_are_rejected_before_writing() {
        let err = to_cents(Money::from_cents(u64::MAX)).unwrap_err();
        assert!(matches!(err, StoreError::Invariant(_)));
    }

    #[test]
    fn pool_timeout_is_treated_as_contention() {
        let err = map_sqlx_error("begin_transaction", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::LockTimeout(_)));
    }
}
