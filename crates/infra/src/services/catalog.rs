//! Catalog and warehouse administration.
//!
//! Products and warehouses are reference data for the cart and checkout. A
//! product is created together with its initial per-warehouse stock in one
//! unit of work.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use storefront_core::{ProductId, WarehouseId};
use storefront_inventory::StockEntry;
use storefront_products::{NewProduct, NewWarehouse, Product, ProductUpdate, Warehouse};

use crate::error::{ShopError, ShopResult};
use crate::services::finish;
use crate::store::{ShopStore, ShopTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockInput {
    pub warehouse_id: WarehouseId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    #[serde(flatten)]
    pub product: Product,
    pub stock: Vec<StockEntry>,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn ShopStore>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn ShopStore>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, input), err)]
    pub async fn create_warehouse(&self, input: NewWarehouse) -> ShopResult<Warehouse> {
        let warehouse = Warehouse::create(input, Utc::now())?;
        let mut tx = self.store.begin().await?;
        let result = tx.insert_warehouse(&warehouse).await.map_err(ShopError::from);
        finish(tx, result).await?;
        info!(warehouse_id = %warehouse.id, "warehouse created");
        Ok(warehouse)
    }

    pub async fn list_warehouses(&self) -> ShopResult<Vec<Warehouse>> {
        let mut tx = self.store.begin().await?;
        let result = tx.list_warehouses().await.map_err(ShopError::from);
        finish(tx, result).await
    }

    pub async fn warehouse_stock(&self, warehouse_id: WarehouseId) -> ShopResult<Vec<StockEntry>> {
        let mut tx = self.store.begin().await?;
        let result = async {
            require_warehouse(&mut *tx, warehouse_id).await?;
            Ok::<_, ShopError>(tx.stock_for_warehouse(warehouse_id).await?)
        }
        .await;
        finish(tx, result).await
    }

    #[instrument(skip(self, input, stock), err)]
    pub async fn create_product(&self, input: NewProduct, stock: Vec<StockInput>) -> ShopResult<ProductStock> {
        let product = Product::create(input, Utc::now())?;
        let entries = stock
            .iter()
            .map(|s| StockEntry::new(product.id, s.warehouse_id, s.quantity))
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self.store.begin().await?;
        let result = async {
            tx.insert_product(&product).await?;
            for entry in &entries {
                require_warehouse(&mut *tx, entry.warehouse_id).await?;
                tx.upsert_stock(*entry).await?;
            }
            Ok::<_, ShopError>(tx.stock_for_product(product.id).await?)
        }
        .await;
        let stock = finish(tx, result).await?;
        info!(product_id = %product.id, warehouses = stock.len(), "product created");
        Ok(ProductStock { product, stock })
    }

    pub async fn product(&self, id: ProductId) -> ShopResult<ProductStock> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let product = tx
                .product(id)
                .await?
                .ok_or_else(|| ShopError::not_found("product", id))?;
            let stock = tx.stock_for_product(id).await?;
            Ok::<_, ShopError>(ProductStock { product, stock })
        }
        .await;
        finish(tx, result).await
    }

    /// One page of the catalog, oldest product first. `page` starts at 1.
    pub async fn list_products(&self, page: u32, limit: u32) -> ShopResult<Vec<Product>> {
        if page == 0 {
            return Err(ShopError::validation("page starts at 1"));
        }
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(ShopError::validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let offset = i64::from(page - 1) * i64::from(limit);

        let mut tx = self.store.begin().await?;
        let result = tx
            .list_products(i64::from(limit), offset)
            .await
            .map_err(ShopError::from);
        finish(tx, result).await
    }

    /// Edit name, description or list price. Cart lines and orders keep the
    /// price they were created with.
    #[instrument(skip(self, update), err)]
    pub async fn update_product(&self, id: ProductId, update: ProductUpdate) -> ShopResult<Product> {
        let mut tx = self.store.begin().await?;
        let result = async {
            let mut product = tx
                .product(id)
                .await?
                .ok_or_else(|| ShopError::not_found("product", id))?;
            product.apply(update)?;
            if !tx.update_product(&product).await? {
                return Err(ShopError::not_found("product", id));
            }
            Ok::<_, ShopError>(product)
        }
        .await;
        let product = finish(tx, result).await?;
        info!(product_id = %product.id, price = %product.price, "product updated");
        Ok(product)
    }

    /// Set the absolute quantity of a product in a warehouse.
    #[instrument(skip(self), err)]
    pub async fn set_stock(&self, product_id: ProductId, warehouse_id: WarehouseId, quantity: i64) -> ShopResult<StockEntry> {
        let entry = StockEntry::new(product_id, warehouse_id, quantity)?;
        let mut tx = self.store.begin().await?;
        let result = async {
            if tx.product(product_id).await?.is_none() {
                return Err(ShopError::not_found("product", product_id));
            }
            require_warehouse(&mut *tx, warehouse_id).await?;
            tx.upsert_stock(entry).await?;
            Ok::<_, ShopError>(entry)
        }
        .await;
        finish(tx, result).await
    }
}

async fn require_warehouse(tx: &mut dyn ShopTx, id: WarehouseId) -> ShopResult<Warehouse> {
    tx.warehouse(id)
        .await?
        .ok_or_else(|| ShopError::not_found("warehouse", id))
}
