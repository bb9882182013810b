use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, put},
};

use storefront_auth::Permission;
use storefront_core::ProductId;
use storefront_infra::services::DEFAULT_PAGE_SIZE;
use storefront_products::{NewProduct, ProductUpdate};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product))
        .route("/:id/stock", put(set_stock))
}

/// Create a product with its initial per-warehouse stock.
pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::JsonBody(body): dto::JsonBody<dto::CreateProductRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CATALOG_WRITE) {
        return resp;
    }
    let input = NewProduct {
        name: body.name,
        description: body.description,
        price: body.price,
    };
    errors::respond(StatusCode::CREATED, services.catalog.create_product(input, body.stock).await)
}

/// Catalog listing, `?page=1&limit=20`.
pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::QueryParams(query): dto::QueryParams<dto::ProductListQuery>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CATALOG_READ) {
        return resp;
    }
    let page = query.page.unwrap_or(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
    errors::respond(StatusCode::OK, services.catalog.list_products(page, limit).await)
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<ProductUpdate>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CATALOG_WRITE) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.catalog.update_product(id, body).await)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CATALOG_READ) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.catalog.product(id).await)
}

pub async fn set_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<dto::SetStockRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::INVENTORY_WRITE) {
        return resp;
    }
    let id: ProductId = match dto::parse_id(&id, "product") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .catalog
        .set_stock(id, body.warehouse_id, body.quantity)
        .await;
    errors::respond(StatusCode::OK, result)
}
