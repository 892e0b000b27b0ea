use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::response::{ApiResponse, Meta};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("quantity must be greater than 0")]
    InvalidQuantity,

    #[error("quantity cannot be less than 1")]
    MinimumQuantity,

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid checkout status {0}")]
    InvalidStatus(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("product not found")]
    Product,

    #[error("variant not found")]
    Variant,

    #[error("cart item not found")]
    CartItem,

    #[error("cart not found")]
    Cart,

    #[error("checkout not found")]
    Checkout,

    #[error("checkout item not found")]
    CheckoutItem,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StockError {
    #[error("item out of stock")]
    OutOfStock,

    #[error("you can't add more than {max_stock} units")]
    StockExceeded { max_stock: i32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("your cart is empty")]
    EmptyCart,

    #[error("cart is already paid")]
    CartAlreadyPaid,

    #[error("invalid payment method {0}")]
    InvalidPaymentMethod(String),

    #[error("cannot move checkout from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("checkout is already settled")]
    AlreadySettled,

    #[error("checkout is cancelled")]
    CheckoutCancelled,

    #[error("checkout is not awaiting an online payment")]
    NotAwaitingPayment,

    #[error("only pending checkouts can be edited")]
    CheckoutNotEditable,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CouponError {
    #[error("invalid or expired coupon")]
    NotFound,

    #[error("coupon cannot be applied")]
    NotApplicable,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error(transparent)]
    Stock(#[from] StockError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error("Unauthorized {0}")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error")]
    DbError(#[from] sqlx::Error),

    #[error("ORM error")]
    OrmError(#[from] sea_orm::DbErr),

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable identifier for clients, independent of the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(ValidationError::InvalidQuantity) => "invalid_quantity",
            AppError::Validation(ValidationError::MinimumQuantity) => "minimum_quantity",
            AppError::Validation(ValidationError::MissingField(_)) => "missing_field",
            AppError::Validation(ValidationError::InvalidStatus(_)) => "invalid_status",
            AppError::NotFound(NotFoundError::Variant) => "variant_not_found",
            AppError::NotFound(_) => "not_found",
            AppError::Stock(StockError::OutOfStock) => "out_of_stock",
            AppError::Stock(StockError::StockExceeded { .. }) => "stock_exceeded",
            AppError::State(StateError::EmptyCart) => "empty_cart",
            AppError::State(StateError::CartAlreadyPaid) => "cart_already_paid",
            AppError::State(StateError::InvalidPaymentMethod(_)) => "invalid_payment_method",
            AppError::State(StateError::InvalidTransition { .. }) => "invalid_transition",
            AppError::State(StateError::AlreadySettled) => "already_settled",
            AppError::State(StateError::CheckoutCancelled) => "checkout_cancelled",
            AppError::State(StateError::NotAwaitingPayment) => "not_awaiting_payment",
            AppError::State(StateError::CheckoutNotEditable) => "checkout_not_editable",
            AppError::Coupon(CouponError::NotFound) => "coupon_not_found",
            AppError::Coupon(CouponError::NotApplicable) => "coupon_not_applicable",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => "unavailable",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) | AppError::Coupon(CouponError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            AppError::Coupon(CouponError::NotApplicable) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Stock(_) | AppError::State(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DbError(_) | AppError::OrmError(_) | AppError::Internal(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorData {
    error: String,
    code: &'static str,
    retryable: bool,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.is_retryable() {
            // internal details stay in the log, the client only sees the generic message
            match &self {
                AppError::DbError(err) => tracing::error!(error = %err, "database failure"),
                AppError::OrmError(err) => tracing::error!(error = %err, "orm failure"),
                AppError::Internal(err) => tracing::error!(error = %err, "internal failure"),
                _ => {}
            }
        }

        let body = ApiResponse {
            message: self.to_string(),
            data: Some(ErrorData {
                error: self.to_string(),
                code: self.code(),
                retryable: self.is_retryable(),
            }),
            meta: Some(Meta::empty()),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_are_not_retryable() {
        let err = AppError::from(StockError::StockExceeded { max_stock: 10 });
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "stock_exceeded");
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "you can't add more than 10 units");
    }

    #[test]
    fn storage_failures_are_retryable() {
        let err = AppError::from(sea_orm::DbErr::Custom("catalog unavailable".into()));
        assert!(err.is_retryable());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn coupon_errors_map_to_distinct_statuses() {
        assert_eq!(
            AppError::from(CouponError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(CouponError::NotApplicable).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
