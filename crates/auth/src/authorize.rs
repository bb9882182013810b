use std::collections::HashSet;

use thiserror::Error;

use storefront_core::UserId;

use crate::{JwtClaims, Permission, Role};

/// A fully resolved principal for authorization decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl Principal {
    /// Resolve roles from verified claims into effective permissions.
    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(claims.sub, claims.roles.clone())
    }

    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        let mut seen = HashSet::new();
        let permissions = roles
            .iter()
            .flat_map(|r| role_permissions(r.as_str()))
            .filter(|p| seen.insert(*p))
            .map(Permission::new)
            .collect();
        Self {
            user_id,
            roles,
            permissions,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Owner of the resource, or an admin.
    pub fn can_access(&self, owner: UserId) -> bool {
        self.user_id == owner || self.is_admin()
    }
}

/// Static role → permission mapping.
///
/// Unknown roles grant nothing.
pub fn role_permissions(role: &str) -> Vec<&'static str> {
    match role {
        Role::ADMIN => vec![Permission::WILDCARD],
        Role::CUSTOMER => vec![
            Permission::CART_READ,
            Permission::CART_WRITE,
            Permission::CHECKOUT,
            Permission::ORDERS_READ,
            Permission::PAYMENTS_READ,
            Permission::CATALOG_READ,
        ],
        _ => Vec::new(),
    }
}

/// Authorize a principal for a permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_granted_everything() {
        let p = Principal::new(UserId::new(), vec![Role::admin()]);
        assert!(authorize(&p, &Permission::new(Permission::PAYMENTS_SETTLE)).is_ok());
        assert!(authorize(&p, &Permission::new("anything.else")).is_ok());
    }

    #[test]
    fn customer_cannot_settle_payments() {
        let p = Principal::new(UserId::new(), vec![Role::customer()]);
        assert!(authorize(&p, &Permission::new(Permission::CHECKOUT)).is_ok());
        assert_eq!(
            authorize(&p, &Permission::new(Permission::PAYMENTS_SETTLE)),
            Err(AuthzError::Forbidden("payments.settle".to_string()))
        );
    }

    #[test]
    fn unknown_role_grants_nothing() {
        let p = Principal::new(UserId::new(), vec![Role::new("guest")]);
        assert!(p.permissions.is_empty());
        assert!(authorize(&p, &Permission::new(Permission::CART_READ)).is_err());
    }

    #[test]
    fn owner_or_admin_access() {
        let owner = UserId::new();
        let customer = Principal::new(owner, vec![Role::customer()]);
        let stranger = Principal::new(UserId::new(), vec![Role::customer()]);
        let admin = Principal::new(UserId::new(), vec![Role::admin()]);

        assert!(customer.can_access(owner));
        assert!(!stranger.can_access(owner));
        assert!(admin.can_access(owner));
    }
}
