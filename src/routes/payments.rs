use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::{checkout::CheckoutWithItems, payments::PaymentConfirmedRequest},
    error::AppResult,
    middleware::auth::PaymentActor,
    response::ApiResponse,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{checkout_id}/confirmed", post(payment_confirmed))
        .route("/{checkout_id}/failed", post(payment_failed))
}

#[utoipa::path(
    post,
    path = "/api/payments/{checkout_id}/confirmed",
    params(
        ("checkout_id" = Uuid, Path, description = "Checkout ID")
    ),
    request_body = PaymentConfirmedRequest,
    responses(
        (status = 200, description = "Payment settled, or already settled with the same id", body = ApiResponse<CheckoutWithItems>),
        (status = 401, description = "Missing or invalid payment token"),
        (status = 404, description = "Checkout not found"),
        (status = 409, description = "Checkout cancelled, settled elsewhere or paid in cash"),
    ),
    security(("payment_token" = [])),
    tag = "Payments"
)]
pub async fn payment_confirmed(
    State(state): State<AppState>,
    _actor: PaymentActor,
    Path(checkout_id): Path<Uuid>,
    Json(payload): Json<PaymentConfirmedRequest>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(
        payment_service::payment_confirmed(&state, checkout_id, payload).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/payments/{checkout_id}/failed",
    params(
        ("checkout_id" = Uuid, Path, description = "Checkout ID")
    ),
    responses(
        (status = 200, description = "Checkout cancelled and stock released", body = ApiResponse<CheckoutWithItems>),
        (status = 401, description = "Missing or invalid payment token"),
        (status = 404, description = "Checkout not found"),
        (status = 409, description = "Checkout already settled"),
    ),
    security(("payment_token" = [])),
    tag = "Payments"
)]
pub async fn payment_failed(
    State(state): State<AppState>,
    _actor: PaymentActor,
    Path(checkout_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(
        payment_service::payment_failed(&state, checkout_id).await?,
    ))
}
