//! Order reads. Orders are only ever written by checkout and settlement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use storefront_auth::Principal;
use storefront_core::{OrderId, UserId};
use storefront_sales::{Order, OrderFilter, OrderItem};

use crate::error::{ShopError, ShopResult};
use crate::services::finish;
use crate::store::{ShopStore, ShopTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn ShopStore>,
}

impl OrderService {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self { store }
    }

    /// Owner or admin.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, order_id = %id), err)]
    pub async fn get(&self, principal: &Principal, id: OrderId) -> ShopResult<OrderDetails> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let order = visible_order(&mut *tx, principal, id).await?;
            let items = tx.order_items(id).await?;
            Ok::<_, ShopError>(OrderDetails { order, items })
        }
        .await;
        finish(tx, result).await
    }

    /// Owner or admin.
    pub async fn items(&self, principal: &Principal, id: OrderId) -> ShopResult<Vec<OrderItem>> {
        Ok(self.get(principal, id).await?.items)
    }

    pub async fn mine(&self, user_id: UserId) -> ShopResult<Vec<Order>> {
        let mut tx = self.store.begin().await?;
        let result = tx.orders_for_user(user_id).await.map_err(ShopError::from);
        finish(tx, result).await
    }

    pub async fn all(&self) -> ShopResult<Vec<Order>> {
        self.filter(&OrderFilter::default()).await
    }

    #[instrument(skip(self), err)]
    pub async fn filter(&self, filter: &OrderFilter) -> ShopResult<Vec<Order>> {
        filter.validate()?;
        let mut tx = self.store.begin().await?;
        let result = tx.filter_orders(filter).await.map_err(ShopError::from);
        finish(tx, result).await
    }
}

async fn visible_order(tx: &mut dyn ShopTx, principal: &Principal, id: OrderId) -> ShopResult<Order> {
    let order = tx
        .order(id, false)
        .await?
        .ok_or_else(|| ShopError::not_found("order", id))?;
    if !principal.can_access(order.user_id) {
        return Err(ShopError::Ownership(format!("order {id} belongs to another user")));
    }
    Ok(order)
}
