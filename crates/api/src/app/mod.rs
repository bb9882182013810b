//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: the storefront services sharing one store handle
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request DTOs and path/query parsing helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use storefront_infra::{InMemoryShopStore, ShopConfig, ShopStore};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(jwt_secret: String, store: Arc<dyn ShopStore>, config: ShopConfig) -> Router {
    let jwt = Arc::new(storefront_auth::Hs256JwtValidator::new(jwt_secret.into_bytes()));
    let auth_state = middleware::AuthState { jwt };

    let services = Arc::new(services::AppServices::new(store, config));

    // Protected routes: require a valid bearer token.
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth_state,
                middleware::auth_middleware,
            ))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}

/// Router over a fresh in-memory store with default settings.
pub fn build_in_memory_app(jwt_secret: String) -> Router {
    let config = ShopConfig::default();
    let store: Arc<dyn ShopStore> = Arc::new(InMemoryShopStore::new(config.lock_timeout));
    build_app(jwt_secret, store, config)
}
