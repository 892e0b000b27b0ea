use axum::{
    Json, Router,
    extract::{Path, State},
    routing::patch,
};
use uuid::Uuid;

use crate::{
    dto::checkout::{CheckoutWithItems, UpdateCheckoutItemRequest, UpdateStatusRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    services::checkout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkouts/{id}/status", patch(update_checkout_status))
        .route(
            "/checkouts/{id}/items/{item_id}",
            patch(update_checkout_item).delete(remove_checkout_item),
        )
}

#[utoipa::path(
    patch,
    path = "/api/admin/checkouts/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Checkout ID")
    ),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<CheckoutWithItems>),
        (status = 400, description = "Unknown status"),
        (status = 403, description = "Admin only"),
        (status = 409, description = "Transition not allowed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_checkout_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(
        checkout_service::update_status(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/api/admin/checkouts/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Checkout ID"),
        ("item_id" = Uuid, Path, description = "Checkout item ID")
    ),
    request_body = UpdateCheckoutItemRequest,
    responses(
        (status = 200, description = "Item quantity changed and totals recomputed", body = ApiResponse<CheckoutWithItems>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Checkout or item not found"),
        (status = 409, description = "Checkout no longer pending or stock exceeded"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn update_checkout_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateCheckoutItemRequest>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(
        checkout_service::update_item_quantity(&state, &user, id, item_id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/admin/checkouts/{id}/items/{item_id}",
    params(
        ("id" = Uuid, Path, description = "Checkout ID"),
        ("item_id" = Uuid, Path, description = "Checkout item ID")
    ),
    responses(
        (status = 200, description = "Item removed and totals recomputed", body = ApiResponse<CheckoutWithItems>),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Checkout or item not found"),
        (status = 409, description = "Checkout no longer pending"),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn remove_checkout_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(
        checkout_service::remove_item(&state, &user, id, item_id).await?,
    ))
}
