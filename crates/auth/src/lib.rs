//! `storefront-auth`: authentication and authorization boundary.
//!
//! Nothing here depends on HTTP or storage. It verifies
//! bearer tokens, resolves roles to permissions and answers "may this
//! principal do X".

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod permissions;
pub mod roles;

pub use authorize::{authorize, AuthzError, Principal};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtValidator};
pub use permissions::Permission;
pub use roles::Role;
