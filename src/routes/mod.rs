use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod cart;
pub mod checkouts;
pub mod doc;
pub mod health;
pub mod params;
pub mod payments;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/cart", cart::router())
        .nest("/checkouts", checkouts::router())
        .nest("/payments", payments::router())
        .nest("/admin", admin::router())
}
