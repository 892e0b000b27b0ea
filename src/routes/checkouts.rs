use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::checkout::{CheckoutList, CheckoutRequest, CheckoutWithItems},
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::CheckoutListQuery,
    services::checkout_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_checkouts).post(checkout))
        .route("/{id}", get(get_checkout))
}

#[utoipa::path(
    post,
    path = "/api/checkouts",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout created; online methods carry a payment redirect", body = ApiResponse<CheckoutWithItems>),
        (status = 400, description = "Missing contact field"),
        (status = 409, description = "Empty cart, invalid payment method or insufficient stock"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkouts"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(
        checkout_service::checkout(&state, &user, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/checkouts",
    params(CheckoutListQuery),
    responses(
        (status = 200, description = "Checkouts of the current user", body = ApiResponse<CheckoutList>)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkouts"
)]
pub async fn list_checkouts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<CheckoutListQuery>,
) -> AppResult<Json<ApiResponse<CheckoutList>>> {
    Ok(Json(
        checkout_service::list_checkouts(&state, &user, query).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/checkouts/{id}",
    params(
        ("id" = Uuid, Path, description = "Checkout ID")
    ),
    responses(
        (status = 200, description = "Checkout with its frozen items", body = ApiResponse<CheckoutWithItems>),
        (status = 404, description = "Checkout not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Checkouts"
)]
pub async fn get_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<CheckoutWithItems>>> {
    Ok(Json(checkout_service::get_checkout(&state, &user, id).await?))
}
