use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};

use storefront_auth::Permission;
use storefront_core::CartItemId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_mine).post(add_item).delete(clear))
        .route("/total", get(total))
        .route("/all", get(list_all))
        .route("/:id", get(get_item).put(update_quantity).delete(remove_item))
}

pub async fn add_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::JsonBody(body): dto::JsonBody<dto::AddToCartRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_WRITE) {
        return resp;
    }
    let result = services
        .cart
        .add_item(principal.user_id(), body.product_id, body.quantity)
        .await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_mine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_READ) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.cart.list_mine(principal.user_id()).await)
}

pub async fn clear(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_WRITE) {
        return resp;
    }
    match services.cart.clear(principal.user_id()).await {
        Ok(removed) => Json(serde_json::json!({ "removed": removed })).into_response(),
        Err(e) => errors::shop_error_to_response(e),
    }
}

pub async fn total(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_READ) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.cart.total(principal.user_id()).await)
}

pub async fn list_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_READ_ALL) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.cart.list_all().await)
}

pub async fn get_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_READ) {
        return resp;
    }
    let id: CartItemId = match dto::parse_id(&id, "cart item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.cart.get(principal.principal(), id).await)
}

pub async fn update_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    dto::JsonBody(body): dto::JsonBody<dto::UpdateQuantityRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_WRITE) {
        return resp;
    }
    let id: CartItemId = match dto::parse_id(&id, "cart item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let result = services
        .cart
        .update_quantity(principal.principal(), id, body.quantity)
        .await;
    errors::respond(StatusCode::OK, result)
}

pub async fn remove_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CART_WRITE) {
        return resp;
    }
    let id: CartItemId = match dto::parse_id(&id, "cart item") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.cart.remove(principal.principal(), id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::shop_error_to_response(e),
    }
}
