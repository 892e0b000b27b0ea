use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::cart::{
        AddToCartRequest, AddToCartResponse, AdjustQuantityRequest, AdjustQuantityResponse,
        ApplyCouponRequest, CartView,
    },
    error::AppResult,
    middleware::auth::AuthUser,
    pricing::CartTotals,
    response::ApiResponse,
    services::cart_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(view_cart))
        .route("/items", post(add_to_cart))
        .route("/items/{id}", patch(adjust_quantity).delete(remove_from_cart))
        .route("/coupon", post(apply_coupon))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    responses(
        (status = 200, description = "Open cart with live totals", body = ApiResponse<CartView>)
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn view_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<CartView>>> {
    Ok(Json(cart_service::view_cart(&state, &user).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart/items",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Item added or merged", body = ApiResponse<AddToCartResponse>),
        (status = 400, description = "Invalid quantity"),
        (status = 404, description = "Product or variant not found"),
        (status = 409, description = "Out of stock or stock exceeded"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<AddToCartRequest>,
) -> AppResult<Json<ApiResponse<AddToCartResponse>>> {
    Ok(Json(cart_service::add_to_cart(&state, &user, payload).await?))
}

#[utoipa::path(
    patch,
    path = "/api/cart/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart item ID")
    ),
    request_body = AdjustQuantityRequest,
    responses(
        (status = 200, description = "Quantity adjusted", body = ApiResponse<AdjustQuantityResponse>),
        (status = 400, description = "Quantity would drop below one"),
        (status = 404, description = "Cart item not found"),
        (status = 409, description = "Stock exceeded"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn adjust_quantity(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustQuantityRequest>,
) -> AppResult<Json<ApiResponse<AdjustQuantityResponse>>> {
    Ok(Json(
        cart_service::adjust_quantity(&state, &user, id, payload).await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/cart/items/{id}",
    params(
        ("id" = Uuid, Path, description = "Cart item ID")
    ),
    responses(
        (status = 200, description = "Item removed", body = ApiResponse<CartTotals>),
        (status = 404, description = "Cart item not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn remove_from_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CartTotals>>> {
    Ok(Json(cart_service::remove_from_cart(&state, &user, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/cart/coupon",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon attached to the cart", body = ApiResponse<CartTotals>),
        (status = 404, description = "Unknown, expired or out-of-window coupon"),
        (status = 422, description = "Cart below the coupon minimum"),
    ),
    security(("bearer_auth" = [])),
    tag = "Cart"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ApplyCouponRequest>,
) -> AppResult<Json<ApiResponse<CartTotals>>> {
    Ok(Json(cart_service::apply_coupon(&state, &user, payload).await?))
}
