use storefront_auth::{JwtClaims, Principal, Role};
use storefront_core::UserId;

/// Principal context for a request (authenticated identity, roles and
/// resolved permissions).
///
/// Inserted by the auth middleware; present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn from_claims(claims: &JwtClaims) -> Self {
        Self::new(Principal::from_claims(claims))
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.principal.roles
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}
