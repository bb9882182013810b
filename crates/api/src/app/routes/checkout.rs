use std::sync::Arc;

use axum::{
    Router,
    extract::Extension,
    http::StatusCode,
    response::Response,
    routing::post,
};

use storefront_auth::Permission;
use storefront_infra::services::CheckoutRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", post(checkout))
}

/// Turn selected cart lines into an order and a payment in one unit of work.
pub async fn checkout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::JsonBody(body): dto::JsonBody<CheckoutRequest>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::CHECKOUT) {
        return resp;
    }
    let result = services.checkout.checkout(principal.user_id(), body).await;
    errors::respond(StatusCode::CREATED, result)
}
