//! Payment reads.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use storefront_auth::Principal;
use storefront_core::{PaymentId, UserId};
use storefront_sales::{Order, Payment, PaymentStatus};

use crate::error::{ShopError, ShopResult};
use crate::services::finish;
use crate::store::{PaymentRecord, ShopStore, ShopTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentWithOrder {
    pub payment: Payment,
    pub order: Option<Order>,
}

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn ShopStore>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self { store }
    }

    /// Owner or admin.
    pub async fn get(&self, principal: &Principal, id: PaymentId) -> ShopResult<PaymentRecord> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let payment = visible_payment(&mut *tx, principal, id).await?;
            let order_id = tx.order_for_payment(id, false).await?.map(|o| o.id);
            Ok::<_, ShopError>(PaymentRecord { payment, order_id })
        }
        .await;
        finish(tx, result).await
    }

    /// Owner or admin.
    pub async fn with_order(&self, principal: &Principal, id: PaymentId) -> ShopResult<PaymentWithOrder> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let payment = visible_payment(&mut *tx, principal, id).await?;
            let order = tx.order_for_payment(id, false).await?;
            Ok::<_, ShopError>(PaymentWithOrder { payment, order })
        }
        .await;
        finish(tx, result).await
    }

    pub async fn mine(&self, user_id: UserId) -> ShopResult<Vec<PaymentRecord>> {
        let mut tx = self.store.begin().await?;
        let result = tx.payments_for_user(user_id).await.map_err(ShopError::from);
        finish(tx, result).await
    }

    pub async fn list(&self, status: Option<PaymentStatus>) -> ShopResult<Vec<PaymentRecord>> {
        let mut tx = self.store.begin().await?;
        let result = tx.list_payments(status).await.map_err(ShopError::from);
        finish(tx, result).await
    }
}

async fn visible_payment(tx: &mut dyn ShopTx, principal: &Principal, id: PaymentId) -> ShopResult<Payment> {
    let payment = tx
        .payment(id, false)
        .await?
        .ok_or_else(|| ShopError::not_found("payment", id))?;
    if !principal.can_access(payment.user_id) {
        return Err(ShopError::Ownership(format!("payment {id} belongs to another user")));
    }
    Ok(payment)
}
