use std::sync::Arc;

use storefront_infra::ShopConfig;
use storefront_infra::ShopStore;
use storefront_infra::services::{
    CartService, CatalogService, CheckoutService, OrderService, PaymentService, SettlementService,
};

/// Every storefront service, sharing one store handle.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: CatalogService,
    pub cart: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub settlement: SettlementService,
}

impl AppServices {
    pub fn new(store: Arc<dyn ShopStore>, config: ShopConfig) -> Self {
        Self {
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), config),
            orders: OrderService::new(store.clone()),
            payments: PaymentService::new(store.clone()),
            settlement: SettlementService::new(store),
        }
    }
}
