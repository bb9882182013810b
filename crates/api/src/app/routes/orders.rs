use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};

use storefront_auth::Permission;
use storefront_core::OrderId;
use storefront_sales::OrderFilter;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_mine))
        .route("/all", get(list_all))
        .route("/filter", post(filter))
        .route("/:id", get(get_order))
        .route("/:id/items", get(list_items))
}

pub async fn list_mine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::ORDERS_READ) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.orders.mine(principal.user_id()).await)
}

pub async fn list_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::ORDERS_READ_ALL) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.orders.all().await)
}

pub async fn filter(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::JsonBody(body): dto::JsonBody<OrderFilter>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::ORDERS_READ_ALL) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.orders.filter(&body).await)
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::ORDERS_READ) {
        return resp;
    }
    let id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.orders.get(principal.principal(), id).await)
}

pub async fn list_items(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::ORDERS_READ) {
        return resp;
    }
    let id: OrderId = match dto::parse_id(&id, "order") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.orders.items(principal.principal(), id).await)
}
