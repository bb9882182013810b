//! Payment settlement.
//!
//! Moves a payment out of `pending` (verify, fail) or out of `completed`
//! (refund) and cascades the linked order in the same unit of work. Both rows
//! are locked before either is written; an illegal move leaves both untouched.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use storefront_core::PaymentId;
use storefront_sales::{Order, Payment, PaymentStatus};

use crate::error::{ShopError, ShopResult};
use crate::services::finish;
use crate::store::{ShopStore, ShopTx};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub payment: Payment,
    /// `None` only for a payment that was never linked to an order.
    pub order: Option<Order>,
}

#[derive(Clone)]
pub struct SettlementService {
    store: Arc<dyn ShopStore>,
}

impl SettlementService {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self { store }
    }

    /// `pending → completed`, order `pending → confirmed`.
    pub async fn verify(&self, payment_id: PaymentId) -> ShopResult<SettlementOutcome> {
        self.settle(payment_id, PaymentStatus::Completed).await
    }

    /// `pending → failed`, order `pending → payment_failed`.
    pub async fn fail(&self, payment_id: PaymentId) -> ShopResult<SettlementOutcome> {
        self.settle(payment_id, PaymentStatus::Failed).await
    }

    /// `completed → refunded`, order `confirmed → cancelled`. Stock stays deducted.
    pub async fn refund(&self, payment_id: PaymentId) -> ShopResult<SettlementOutcome> {
        self.settle(payment_id, PaymentStatus::Refunded).await
    }

    #[instrument(skip(self), fields(payment_id = %payment_id, next = %next), err)]
    async fn settle(&self, payment_id: PaymentId, next: PaymentStatus) -> ShopResult<SettlementOutcome> {
        let mut tx = self.store.begin().await?;
        let result = apply(&mut *tx, payment_id, next).await;
        let outcome = finish(tx, result).await?;
        info!(
            status = %outcome.payment.status,
            order_id = ?outcome.order.as_ref().map(|o| o.id),
            "payment settled"
        );
        Ok(outcome)
    }
}

async fn apply(
    tx: &mut dyn ShopTx,
    payment_id: PaymentId,
    next: PaymentStatus,
) -> ShopResult<SettlementOutcome> {
    let mut payment = tx
        .payment(payment_id, true)
        .await?
        .ok_or_else(|| ShopError::not_found("payment", payment_id))?;
    let mut order = tx.order_for_payment(payment_id, true).await?;

    let now = Utc::now();
    payment.transition(next, now)?;
    if let (Some(order), Some(cascade)) = (order.as_mut(), next.cascades_to()) {
        order.transition(cascade, now)?;
    }

    tx.set_payment_status(payment.id, payment.status, now).await?;
    if let Some(order) = &order {
        tx.set_order_status(order.id, order.status, now).await?;
    }

    Ok(SettlementOutcome { payment, order })
}
