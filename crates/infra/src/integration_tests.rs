//! End-to-end service tests against the in-memory store.
//!
//! Covers the checkout unit of work (success, shortfall, ownership, missing
//! items), concurrent checkouts racing for the same stock row, settlement
//! cascades and cart add/update rules.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use storefront_auth::{Principal, Role};
    use storefront_core::{CartItemId, Money, PaymentId, ProductId, UserId, WarehouseId};
    use storefront_products::{NewProduct, NewWarehouse, ProductUpdate};
    use storefront_sales::{OrderFilter, OrderStatus, PaymentStatus};

    use crate::config::{SettlementMode, ShopConfig};
    use crate::error::ShopError;
    use crate::services::{
        CartService, CatalogService, CheckoutRequest, CheckoutService, OrderService,
        PaymentService, SettlementService, StockInput,
    };
    use crate::store::{InMemoryShopStore, ShopStore};

    struct Shop {
        catalog: CatalogService,
        cart: CartService,
        checkout: CheckoutService,
        orders: OrderService,
        payments: PaymentService,
        settlement: SettlementService,
    }

    fn shop(settlement: SettlementMode) -> Shop {
        let store: Arc<dyn ShopStore> = Arc::new(InMemoryShopStore::default());
        let config = ShopConfig {
            settlement,
            ..ShopConfig::default()
        };
        Shop {
            catalog: CatalogService::new(store.clone()),
            cart: CartService::new(store.clone()),
            checkout: CheckoutService::new(store.clone(), config),
            orders: OrderService::new(store.clone()),
            payments: PaymentService::new(store.clone()),
            settlement: SettlementService::new(store),
        }
    }

    fn customer() -> Principal {
        Principal::new(UserId::new(), vec![Role::customer()])
    }

    fn admin() -> Principal {
        Principal::new(UserId::new(), vec![Role::admin()])
    }

    impl Shop {
        async fn warehouse(&self, name: &str) -> WarehouseId {
            self.catalog
                .create_warehouse(NewWarehouse {
                    name: name.to_string(),
                    location: "Dock 1".to_string(),
                })
                .await
                .unwrap()
                .id
        }

        async fn product(&self, name: &str, cents: u64, stock: &[(WarehouseId, i64)]) -> ProductId {
            let stock = stock
                .iter()
                .map(|(warehouse_id, quantity)| StockInput {
                    warehouse_id: *warehouse_id,
                    quantity: *quantity,
                })
                .collect();
            self.catalog
                .create_product(
                    NewProduct {
                        name: name.to_string(),
                        description: None,
                        price: Money::from_cents(cents),
                    },
                    stock,
                )
                .await
                .unwrap()
                .product
                .id
        }

        async fn stock(&self, product: ProductId, warehouse: WarehouseId) -> i64 {
            self.catalog
                .product(product)
                .await
                .unwrap()
                .stock
                .iter()
                .find(|e| e.warehouse_id == warehouse)
                .map_or(0, |e| e.quantity)
        }

        async fn add(&self, user: UserId, product: ProductId, quantity: i64) -> CartItemId {
            self.cart.add_item(user, product, quantity).await.unwrap().item.id
        }

        async fn order_count(&self) -> usize {
            self.orders.all().await.unwrap().len()
        }

        async fn payment_count(&self) -> usize {
            self.payments.list(None).await.unwrap().len()
        }
    }

    fn request(ids: Vec<CartItemId>) -> CheckoutRequest {
        CheckoutRequest {
            cart_item_ids: ids,
            shipping_address: "1 Main St, Springfield".to_string(),
            payment_method: None,
        }
    }

    #[tokio::test]
    async fn checkout_commits_order_payment_stock_and_cart_together() {
        let shop = shop(SettlementMode::Immediate);
        let user = customer();
        let wh = shop.warehouse("Central").await;
        let x = shop.product("Product X", 1_000, &[(wh, 10)]).await;
        let y = shop.product("Product Y", 500, &[(wh, 4)]).await;
        let ix = shop.add(user.user_id, x, 3).await;
        let iy = shop.add(user.user_id, y, 1).await;

        let receipt = shop.checkout.checkout(user.user_id, request(vec![ix, iy])).await.unwrap();

        assert_eq!(receipt.total_amount, Money::from_cents(3_500));
        assert_eq!(receipt.order_status, OrderStatus::Confirmed);
        assert_eq!(receipt.payment_status, PaymentStatus::Completed);
        assert_eq!(receipt.payment_method.as_str(), "card");
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[0].cart_item_id, ix);
        assert_eq!(receipt.items[0].line_total, Money::from_cents(3_000));

        assert_eq!(shop.stock(x, wh).await, 7);
        assert_eq!(shop.stock(y, wh).await, 3);
        assert!(shop.cart.list_mine(user.user_id).await.unwrap().is_empty());

        let details = shop.orders.get(&user, receipt.order_id).await.unwrap();
        assert_eq!(details.order.payment_id, Some(receipt.payment_id));
        let items_total: u64 = details
            .items
            .iter()
            .map(|i| i.line_total().unwrap().cents())
            .sum();
        assert_eq!(items_total, details.order.total_amount.cents());

        let linked = shop.payments.with_order(&user, receipt.payment_id).await.unwrap();
        assert_eq!(linked.order.map(|o| o.id), Some(receipt.order_id));
    }

    #[tokio::test]
    async fn shortfall_aborts_without_any_effect() {
        let shop = shop(SettlementMode::Immediate);
        let user = customer();
        let wh = shop.warehouse("Central").await;
        let x = shop.product("Product X", 1_000, &[(wh, 3)]).await;
        let y = shop.product("Product Y", 500, &[(wh, 4)]).await;
        let iy = shop.add(user.user_id, y, 1).await;
        let ix = shop.add(user.user_id, x, 3).await;

        // Another path drains X below the cart quantity.
        shop.catalog.set_stock(x, wh, 2).await.unwrap();

        let err = shop
            .checkout
            .checkout(user.user_id, request(vec![iy, ix]))
            .await
            .unwrap_err();

        match err {
            ShopError::InsufficientStock(shortfall) => {
                assert_eq!(shortfall.product_id, x);
                assert_eq!(shortfall.product_name, "Product X");
                assert_eq!(shortfall.warehouse_id, wh);
                assert_eq!(shortfall.available, 2);
                assert_eq!(shortfall.requested, 3);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        assert_eq!(shop.order_count().await, 0);
        assert_eq!(shop.payment_count().await, 0);
        assert_eq!(shop.stock(x, wh).await, 2);
        assert_eq!(shop.stock(y, wh).await, 4);
        assert_eq!(shop.cart.list_mine(user.user_id).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checkouts_for_last_units_admit_exactly_one() {
        let shop = Arc::new(shop(SettlementMode::Immediate));
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Last Widget", 250, &[(wh, 5)]).await;

        let alice = customer();
        let bob = customer();
        let ia = shop.add(alice.user_id, p, 5).await;
        let ib = shop.add(bob.user_id, p, 5).await;

        let a = {
            let shop = shop.clone();
            tokio::spawn(async move { shop.checkout.checkout(alice.user_id, request(vec![ia])).await })
        };
        let b = {
            let shop = shop.clone();
            tokio::spawn(async move { shop.checkout.checkout(bob.user_id, request(vec![ib])).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);
        for result in &results {
            if let Err(err) = result {
                assert!(
                    matches!(err, ShopError::InsufficientStock(_) | ShopError::Conflict(_)),
                    "unexpected error {err:?}"
                );
            }
        }
        assert_eq!(shop.stock(p, wh).await, 0);
        assert_eq!(shop.order_count().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_concurrent_checkouts_never_oversell() {
        let shop = Arc::new(shop(SettlementMode::Immediate));
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Gadget", 100, &[(wh, 7)]).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let user = customer();
            let item = shop.add(user.user_id, p, 2).await;
            let shop = shop.clone();
            handles.push(tokio::spawn(async move {
                shop.checkout.checkout(user.user_id, request(vec![item])).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 3);
        assert_eq!(shop.stock(p, wh).await, 1);
    }

    #[tokio::test]
    async fn foreign_cart_item_fails_the_whole_checkout() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let me = customer();
        let other = customer();
        let mine = shop.add(me.user_id, p, 1).await;
        let theirs = shop.add(other.user_id, p, 1).await;

        let err = shop
            .checkout
            .checkout(me.user_id, request(vec![mine, theirs]))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::Ownership(_)), "got {err:?}");
        assert_eq!(shop.order_count().await, 0);
        assert_eq!(shop.stock(p, wh).await, 10);
        assert_eq!(shop.cart.list_mine(me.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_cart_item_fails_closed() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 1).await;

        let err = shop
            .checkout
            .checkout(user.user_id, request(vec![item, CartItemId::new()]))
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::NotFound { entity: "cart item", .. }), "got {err:?}");
        assert_eq!(shop.stock(p, wh).await, 10);
    }

    #[tokio::test]
    async fn empty_selection_and_blank_address_are_validation_errors() {
        let shop = shop(SettlementMode::Immediate);
        let user = customer();

        let err = shop.checkout.checkout(user.user_id, request(vec![])).await.unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));

        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let item = shop.add(user.user_id, p, 1).await;
        let mut blank = request(vec![item]);
        blank.shipping_address = "   ".to_string();
        let err = shop.checkout.checkout(user.user_id, blank).await.unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
        assert_eq!(shop.order_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_request_are_consumed_once() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 2).await;

        let receipt = shop
            .checkout
            .checkout(user.user_id, request(vec![item, item]))
            .await
            .unwrap();

        assert_eq!(receipt.items.len(), 1);
        assert_eq!(receipt.total_amount, Money::from_cents(800));
        assert_eq!(shop.stock(p, wh).await, 8);
    }

    #[tokio::test]
    async fn checkout_uses_cart_price_snapshot() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 2).await;

        let repriced = shop
            .catalog
            .update_product(
                p,
                ProductUpdate {
                    price: Some(Money::from_cents(950)),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(repriced.price, Money::from_cents(950));

        let receipt = shop.checkout.checkout(user.user_id, request(vec![item])).await.unwrap();
        assert_eq!(receipt.items[0].unit_price, Money::from_cents(400));
        assert_eq!(receipt.total_amount, Money::from_cents(800));

        let details = shop.orders.get(&user, receipt.order_id).await.unwrap();
        assert_eq!(details.order.total_amount, Money::from_cents(800));
        assert_eq!(details.items[0].price, Money::from_cents(400));

        let fresh = customer();
        let line = shop.cart.add_item(fresh.user_id, p, 1).await.unwrap();
        assert_eq!(line.item.unit_price, Money::from_cents(950));
    }

    #[tokio::test]
    async fn product_updates_validate_and_listing_pages() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let first = shop.product("Widget", 400, &[(wh, 1)]).await;
        let second = shop.product("Gadget", 700, &[(wh, 1)]).await;

        let err = shop
            .catalog
            .update_product(
                first,
                ProductUpdate {
                    price: Some(Money::ZERO),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
        assert_eq!(shop.catalog.product(first).await.unwrap().product.price, Money::from_cents(400));

        let err = shop
            .catalog
            .update_product(
                ProductId::new(),
                ProductUpdate {
                    name: Some("Ghost".to_string()),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotFound { entity: "product", .. }));

        let mut everything: Vec<ProductId> = shop
            .catalog
            .list_products(1, 20)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        everything.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(everything, expected);

        let page_one = shop.catalog.list_products(1, 1).await.unwrap();
        let page_two = shop.catalog.list_products(2, 1).await.unwrap();
        assert_eq!(page_one.len(), 1);
        assert_eq!(page_two.len(), 1);
        assert_ne!(page_one[0].id, page_two[0].id);
        assert!(shop.catalog.list_products(3, 1).await.unwrap().is_empty());
        assert!(matches!(
            shop.catalog.list_products(0, 20).await.unwrap_err(),
            ShopError::Validation(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn double_submit_consumes_cart_item_once() {
        let shop = Arc::new(shop(SettlementMode::Immediate));
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 2).await;

        let mut handles = Vec::new();
        for _ in 0..2 {
            let shop = shop.clone();
            let user_id = user.user_id;
            handles.push(tokio::spawn(async move {
                shop.checkout.checkout(user_id, request(vec![item])).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => succeeded += 1,
                Err(err) => assert!(matches!(err, ShopError::NotFound { entity: "cart item", .. })),
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(shop.stock(p, wh).await, 8);
        assert_eq!(shop.orders.mine(user.user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn deferred_checkout_waits_for_verify() {
        let shop = shop(SettlementMode::Deferred);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 1).await;

        let receipt = shop.checkout.checkout(user.user_id, request(vec![item])).await.unwrap();
        assert_eq!(receipt.order_status, OrderStatus::Pending);
        assert_eq!(receipt.payment_status, PaymentStatus::Pending);
        assert_eq!(shop.stock(p, wh).await, 9);

        let outcome = shop.settlement.verify(receipt.payment_id).await.unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Completed);
        assert_eq!(outcome.order.unwrap().status, OrderStatus::Confirmed);

        let err = shop.settlement.verify(receipt.payment_id).await.unwrap_err();
        assert!(matches!(err, ShopError::IllegalStateTransition { .. }));
    }

    #[tokio::test]
    async fn verify_after_fail_is_rejected_and_order_unchanged() {
        let shop = shop(SettlementMode::Deferred);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 1).await;
        let receipt = shop.checkout.checkout(user.user_id, request(vec![item])).await.unwrap();

        let failed = shop.settlement.fail(receipt.payment_id).await.unwrap();
        assert_eq!(failed.payment.status, PaymentStatus::Failed);
        assert_eq!(failed.order.unwrap().status, OrderStatus::PaymentFailed);

        let err = shop.settlement.verify(receipt.payment_id).await.unwrap_err();
        match err {
            ShopError::IllegalStateTransition { entity, from, to } => {
                assert_eq!(entity, "payment");
                assert_eq!(from, "failed");
                assert_eq!(to, "completed");
            }
            other => panic!("expected IllegalStateTransition, got {other:?}"),
        }

        let order = shop.orders.get(&admin(), receipt.order_id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::PaymentFailed);
        let payment = shop.payments.get(&user, receipt.payment_id).await.unwrap();
        assert_eq!(payment.payment.status, PaymentStatus::Failed);
        assert_eq!(payment.order_id, Some(receipt.order_id));
    }

    #[tokio::test]
    async fn refund_cancels_order_and_keeps_stock_deducted() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 10)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 4).await;
        let receipt = shop.checkout.checkout(user.user_id, request(vec![item])).await.unwrap();

        let outcome = shop.settlement.refund(receipt.payment_id).await.unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Refunded);
        assert_eq!(outcome.order.unwrap().status, OrderStatus::Cancelled);
        assert_eq!(shop.stock(p, wh).await, 6);

        let err = shop.settlement.refund(receipt.payment_id).await.unwrap_err();
        assert!(matches!(err, ShopError::IllegalStateTransition { .. }));
    }

    #[tokio::test]
    async fn settling_unknown_payment_is_not_found() {
        let shop = shop(SettlementMode::Immediate);
        let err = shop.settlement.verify(PaymentId::new()).await.unwrap_err();
        assert!(matches!(err, ShopError::NotFound { entity: "payment", .. }));
    }

    #[tokio::test]
    async fn add_to_cart_picks_fullest_sufficient_warehouse() {
        let shop = shop(SettlementMode::Immediate);
        let small = shop.warehouse("Small").await;
        let big = shop.warehouse("Big").await;
        let p = shop.product("Widget", 400, &[(small, 3), (big, 8)]).await;
        let user = customer();

        let line = shop.cart.add_item(user.user_id, p, 2).await.unwrap();
        assert_eq!(line.item.warehouse_id, big);
        assert_eq!(line.available, 8);
        assert_eq!(line.item.unit_price, Money::from_cents(400));

        let err = shop.cart.add_item(user.user_id, p, 1).await.unwrap_err();
        assert!(matches!(err, ShopError::DuplicateItem { .. }), "got {err:?}");

        let err = shop.cart.add_item(user.user_id, p, 9).await.unwrap_err();
        assert!(matches!(err, ShopError::OutOfStock { requested: 9, .. }), "got {err:?}");

        let err = shop.cart.add_item(user.user_id, p, 0).await.unwrap_err();
        assert!(matches!(err, ShopError::InvalidQuantity(_)));
    }

    #[tokio::test]
    async fn quantity_updates_check_live_stock_and_ownership() {
        let shop = shop(SettlementMode::Immediate);
        let wh = shop.warehouse("Central").await;
        let p = shop.product("Widget", 400, &[(wh, 5)]).await;
        let user = customer();
        let item = shop.add(user.user_id, p, 1).await;

        let line = shop.cart.update_quantity(&user, item, 5).await.unwrap();
        assert_eq!(line.item.quantity, 5);

        let err = shop.cart.update_quantity(&user, item, 6).await.unwrap_err();
        assert!(matches!(err, ShopError::InsufficientStock(_)));

        let err = shop.cart.update_quantity(&user, item, -1).await.unwrap_err();
        assert!(matches!(err, ShopError::InvalidQuantity(_)));

        let err = shop.cart.update_quantity(&customer(), item, 1).await.unwrap_err();
        assert!(matches!(err, ShopError::Ownership(_)));

        assert!(shop.cart.get(&admin(), item).await.is_ok());
        let total = shop.cart.total(user.user_id).await.unwrap();
        assert_eq!(total.item_count, 1);
        assert_eq!(total.total_amount, Money::from_cents(2_000));
    }

    #[tokio::test]
    async fn orders_are_private_to_owner_and_filterable_by_admin() {
        let shop = shop(SettlementMode::Immediate);
        let a = shop.warehouse("A").await;
        let b = shop.warehouse("B").await;
        let pa = shop.product("Alpha", 1_000, &[(a, 10)]).await;
        let pb = shop.product("Beta", 200, &[(b, 10)]).await;
        let user = customer();

        let ia = shop.add(user.user_id, pa, 1).await;
        let first = shop.checkout.checkout(user.user_id, request(vec![ia])).await.unwrap();
        let ib = shop.add(user.user_id, pb, 1).await;
        let second = shop.checkout.checkout(user.user_id, request(vec![ib])).await.unwrap();

        let mine = shop.orders.mine(user.user_id).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].id, second.order_id);

        let err = shop.orders.get(&customer(), first.order_id).await.unwrap_err();
        assert!(matches!(err, ShopError::Ownership(_)));

        let by_warehouse = shop
            .orders
            .filter(&OrderFilter {
                warehouse_id: Some(b),
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_warehouse.len(), 1);
        assert_eq!(by_warehouse[0].id, second.order_id);

        let expensive = shop
            .orders
            .filter(&OrderFilter {
                min_amount: Some(Money::from_cents(500)),
                statuses: vec![OrderStatus::Confirmed],
                ..OrderFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(expensive.len(), 1);
        assert_eq!(expensive[0].id, first.order_id);

        let err = shop
            .orders
            .filter(&OrderFilter {
                min_amount: Some(Money::from_cents(500)),
                max_amount: Some(Money::from_cents(100)),
                ..OrderFilter::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Validation(_)));
    }

    #[tokio::test]
    async fn product_creation_with_unknown_warehouse_leaves_nothing_behind() {
        let shop = shop(SettlementMode::Immediate);
        let real = shop.warehouse("Real").await;
        let err = shop
            .catalog
            .create_product(
                NewProduct {
                    name: "Ghost".to_string(),
                    description: None,
                    price: Money::from_cents(100),
                },
                vec![
                    StockInput {
                        warehouse_id: real,
                        quantity: 3,
                    },
                    StockInput {
                        warehouse_id: WarehouseId::new(),
                        quantity: 3,
                    },
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotFound { entity: "warehouse", .. }));
        assert!(shop.catalog.warehouse_stock(real).await.unwrap().is_empty());
    }
}
