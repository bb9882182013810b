use axum::{Router, routing::get};

pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod products;
pub mod system;
pub mod warehouses;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/cart", cart::router())
        .nest("/checkout", checkout::router())
        .nest("/orders", orders::router())
        .nest("/payments", payments::router())
        .nest("/warehouses", warehouses::router())
        .nest("/products", products::router())
}
