//! API-side permission guard.
//!
//! Handlers call [`require`] before touching a service. Ownership of
//! individual resources is checked by the services themselves.

use axum::http::StatusCode;
use axum::response::Response;

use storefront_auth::{Permission, authorize};

use crate::app::errors;
use crate::context::PrincipalContext;

/// `Err` carries a ready-made 403 response.
pub fn require(principal: &PrincipalContext, permission: &'static str) -> Result<(), Response> {
    authorize(principal.principal(), &Permission::new(permission))
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use storefront_auth::{Principal, Role};
    use storefront_core::UserId;

    fn ctx(role: Role) -> PrincipalContext {
        PrincipalContext::new(Principal::new(UserId::new(), vec![role]))
    }

    #[test]
    fn customers_cannot_settle_payments() {
        let resp = require(&ctx(Role::customer()), Permission::PAYMENTS_SETTLE).unwrap_err();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(require(&ctx(Role::customer()), Permission::CHECKOUT).is_ok());
    }

    #[test]
    fn admins_pass_every_guard() {
        assert!(require(&ctx(Role::admin()), Permission::PAYMENTS_SETTLE).is_ok());
        assert!(require(&ctx(Role::admin()), Permission::ORDERS_READ_ALL).is_ok());
    }
}
