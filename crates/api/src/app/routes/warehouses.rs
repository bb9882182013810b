use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::get,
};

use storefront_auth::Permission;
use storefront_core::WarehouseId;
use storefront_products::NewWarehouse;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_warehouses).post(create_warehouse))
        .route("/:id/stock", get(warehouse_stock))
}

pub async fn create_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::JsonBody(body): dto::JsonBody<NewWarehouse>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::INVENTORY_WRITE) {
        return resp;
    }
    errors::respond(StatusCode::CREATED, services.catalog.create_warehouse(body).await)
}

pub async fn list_warehouses(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CATALOG_READ) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.catalog.list_warehouses().await)
}

pub async fn warehouse_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::INVENTORY_READ) {
        return resp;
    }
    let id: WarehouseId = match dto::parse_id(&id, "warehouse") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.catalog.warehouse_stock(id).await)
}
