//! Cart operations.
//!
//! Add-to-cart picks the warehouse and snapshots the catalog price; later
//! price changes do not touch existing lines. Quantity updates are checked
//! against live stock under a row lock.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use storefront_auth::Principal;
use storefront_cart::{CartItem, CartLine, CartTotal, ensure_positive_quantity};
use storefront_core::{CartItemId, ProductId, UserId};
use storefront_inventory::{StockEntry, select_warehouse};

use crate::error::{ShopError, ShopResult};
use crate::services::finish;
use crate::store::{ShopStore, ShopTx, StoreError};

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn ShopStore>,
}

impl CartService {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id), err)]
    pub async fn add_item(&self, user_id: UserId, product_id: ProductId, quantity: i64) -> ShopResult<CartLine> {
        let mut tx = self.store.begin().await?;
        let result = add_item(&mut *tx, user_id, product_id, quantity).await;
        finish(tx, result).await
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, cart_item_id = %id), err)]
    pub async fn update_quantity(&self, principal: &Principal, id: CartItemId, quantity: i64) -> ShopResult<CartLine> {
        let mut tx = self.store.begin().await?;
        let result = update_quantity(&mut *tx, principal, id, quantity).await;
        finish(tx, result).await
    }

    /// Owner or admin.
    pub async fn get(&self, principal: &Principal, id: CartItemId) -> ShopResult<CartLine> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let line = load_line(&mut *tx, id, false).await?;
            if !principal.can_access(line.item.user_id) {
                return Err(not_yours(id));
            }
            Ok::<_, ShopError>(line)
        }
        .await;
        finish(tx, result).await
    }

    pub async fn list_mine(&self, user_id: UserId) -> ShopResult<Vec<CartLine>> {
        let mut tx = self.store.begin().await?;
        let result = tx.cart_lines_for_user(user_id).await.map_err(ShopError::from);
        finish(tx, result).await
    }

    pub async fn list_all(&self) -> ShopResult<Vec<CartLine>> {
        let mut tx = self.store.begin().await?;
        let result = tx.all_cart_lines().await.map_err(ShopError::from);
        finish(tx, result).await
    }

    /// Owner only.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, cart_item_id = %id), err)]
    pub async fn remove(&self, principal: &Principal, id: CartItemId) -> ShopResult<()> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let item = tx
                .cart_item(id)
                .await?
                .ok_or_else(|| ShopError::not_found("cart item", id))?;
            if !item.belongs_to(principal.user_id) {
                return Err(not_yours(id));
            }
            if !tx.delete_cart_item(id).await? {
                return Err(ShopError::not_found("cart item", id));
            }
            Ok::<_, ShopError>(())
        }
        .await;
        finish(tx, result).await
    }

    /// Returns the number of lines removed.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn clear(&self, user_id: UserId) -> ShopResult<u64> {
        let mut tx = self.store.begin().await?;
        let result = tx.clear_cart(user_id).await.map_err(ShopError::from);
        finish(tx, result).await
    }

    pub async fn total(&self, user_id: UserId) -> ShopResult<CartTotal> {
        let lines = self.list_mine(user_id).await?;
        Ok(CartTotal::of(lines.iter().map(|l| &l.item))?)
    }
}

fn not_yours(id: CartItemId) -> ShopError {
    ShopError::Ownership(format!("cart item {id} belongs to another user"))
}

async fn load_line(tx: &mut dyn ShopTx, id: CartItemId, lock: bool) -> ShopResult<CartLine> {
    tx.cart_lines_by_ids(&[id], lock)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ShopError::not_found("cart item", id))
}

async fn add_item(
    tx: &mut dyn ShopTx,
    user_id: UserId,
    product_id: ProductId,
    quantity: i64,
) -> ShopResult<CartLine> {
    ensure_positive_quantity(quantity).map_err(|e| ShopError::InvalidQuantity(e.to_string()))?;

    let product = tx
        .product(product_id)
        .await?
        .ok_or_else(|| ShopError::not_found("product", product_id))?;

    let stock = tx.stock_for_product(product_id).await?;
    let warehouse_id = select_warehouse(&stock, quantity).ok_or_else(|| ShopError::OutOfStock {
        product_id,
        product_name: product.name.clone(),
        requested: quantity,
    })?;
    let available = stock
        .iter()
        .find(|e| e.warehouse_id == warehouse_id)
        .map_or(0, |e| e.quantity);

    let duplicate = || ShopError::DuplicateItem {
        product_id,
        product_name: product.name.clone(),
        warehouse_id,
    };
    if tx.find_cart_item(user_id, product_id, warehouse_id).await?.is_some() {
        return Err(duplicate());
    }

    let item = CartItem::new(user_id, product_id, warehouse_id, quantity, product.price, Utc::now())?;
    match tx.insert_cart_item(&item).await {
        Ok(()) => {}
        Err(StoreError::Duplicate(_)) => return Err(duplicate()),
        Err(other) => return Err(other.into()),
    }

    Ok(CartLine {
        item,
        product_name: product.name,
        available,
    })
}

async fn update_quantity(
    tx: &mut dyn ShopTx,
    principal: &Principal,
    id: CartItemId,
    quantity: i64,
) -> ShopResult<CartLine> {
    ensure_positive_quantity(quantity).map_err(|e| ShopError::InvalidQuantity(e.to_string()))?;

    let mut line = load_line(tx, id, true).await?;
    if !line.item.belongs_to(principal.user_id) {
        return Err(not_yours(id));
    }

    let item = &line.item;
    let stock = tx
        .lock_stock(item.product_id, item.warehouse_id)
        .await?
        .unwrap_or_else(|| StockEntry::absent(item.product_id, item.warehouse_id));
    stock
        .check(&line.product_name, quantity)
        .map_err(ShopError::InsufficientStock)?;

    if !tx.update_cart_quantity(id, quantity).await? {
        return Err(ShopError::not_found("cart item", id));
    }
    line.item.quantity = quantity;
    line.available = stock.quantity;
    Ok(line)
}
