//! Storefront services.
//!
//! Each service holds a [`ShopStore`](crate::store::ShopStore) handle passed
//! in at construction and runs every public operation inside one unit of
//! work: begin, do the work against the `ShopTx`, then commit on success or
//! roll back on the first error.

use tracing::warn;

use crate::error::ShopResult;
use crate::store::ShopTx;

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod settlement;

pub use cart::CartService;
pub use catalog::{CatalogService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, ProductStock, StockInput};
pub use checkout::{CheckoutReceipt, CheckoutRequest, CheckoutService, CheckoutStage, ReceiptLine};
pub use orders::{OrderDetails, OrderService};
pub use payments::{PaymentService, PaymentWithOrder};
pub use settlement::{SettlementOutcome, SettlementService};

/// Commit when `result` is `Ok`, roll back otherwise.
pub(crate) async fn finish<T>(tx: Box<dyn ShopTx>, result: ShopResult<T>) -> ShopResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
            Err(err)
        }
    }
}
