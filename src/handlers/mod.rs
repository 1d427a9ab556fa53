pub mod admin;
pub mod carts;
pub mod checkout;
pub mod common;
pub mod health;
pub mod orders;
pub mod payments;
pub mod products;

use axum::Router;

use crate::AppState;

/// Assembles the versioned API surface. Health probes live outside the
/// version prefix so orchestration never depends on the API version.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(products::router())
        .merge(carts::router())
        .merge(checkout::router())
        .merge(payments::router())
        .merge(orders::router())
        .merge(admin::router())
}
