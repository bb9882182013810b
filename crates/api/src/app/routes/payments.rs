use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
};

use storefront_auth::Permission;
use storefront_core::PaymentId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_mine))
        .route("/all", get(list_all))
        .route("/:id", get(get_payment))
        .route("/:id/order", get(get_with_order))
        .route("/:id/verify", post(verify))
        .route("/:id/fail", post(fail))
        .route("/:id/refund", post(refund))
}

pub async fn list_mine(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::PAYMENTS_READ) {
        return resp;
    }
    errors::respond(StatusCode::OK, services.payments.mine(principal.user_id()).await)
}

pub async fn list_all(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    dto::QueryParams(query): dto::QueryParams<dto::PaymentListQuery>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::PAYMENTS_READ_ALL) {
        return resp;
    }
    let status = match dto::parse_payment_status(query.status.as_deref()) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.payments.list(status).await)
}

pub async fn get_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::PAYMENTS_READ) {
        return resp;
    }
    let id: PaymentId = match dto::parse_id(&id, "payment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.payments.get(principal.principal(), id).await)
}

pub async fn get_with_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    if let Err(resp) = authz::require(&principal, Permission::PAYMENTS_READ) {
        return resp;
    }
    let id: PaymentId = match dto::parse_id(&id, "payment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.payments.with_order(principal.principal(), id).await)
}

pub async fn verify(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match settle_guard(&principal, &id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.settlement.verify(id).await)
}

pub async fn fail(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match settle_guard(&principal, &id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.settlement.fail(id).await)
}

pub async fn refund(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match settle_guard(&principal, &id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    errors::respond(StatusCode::OK, services.settlement.refund(id).await)
}

fn settle_guard(principal: &PrincipalContext, raw: &str) -> Result<PaymentId, Response> {
    authz::require(principal, Permission::PAYMENTS_SETTLE)?;
    dto::parse_id(raw, "payment")
}
