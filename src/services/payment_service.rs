//! Callbacks from the payment provider.
//!
//! Both callbacks may be delivered more than once. Replaying an event that was
//! already applied returns the checkout unchanged.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use uuid::Uuid;

use crate::{
    audit,
    dto::{checkout::CheckoutWithItems, payments::PaymentConfirmedRequest},
    entity::checkouts::{ActiveModel as CheckoutActive, Model as CheckoutModel},
    error::{AppResult, StateError, ValidationError},
    models::{CheckoutStatus, PaymentMethod},
    response::{ApiResponse, Meta},
    services::checkout_service::{self, method_of, status_of},
    state::AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Apply,
    AlreadyApplied,
}

pub fn confirmation_outcome(
    status: CheckoutStatus,
    method: PaymentMethod,
    paid: bool,
    recorded_external_id: Option<&str>,
    external_id: &str,
) -> Result<Settlement, StateError> {
    if !method.is_online() {
        return Err(StateError::NotAwaitingPayment);
    }
    if paid {
        return match recorded_external_id {
            Some(recorded) if recorded == external_id => Ok(Settlement::AlreadyApplied),
            _ => Err(StateError::AlreadySettled),
        };
    }
    if status == CheckoutStatus::Cancelled {
        return Err(StateError::CheckoutCancelled);
    }
    Ok(Settlement::Apply)
}

pub fn failure_outcome(
    status: CheckoutStatus,
    method: PaymentMethod,
    paid: bool,
) -> Result<Settlement, StateError> {
    if status == CheckoutStatus::Cancelled {
        return Ok(Settlement::AlreadyApplied);
    }
    if !method.is_online() {
        return Err(StateError::NotAwaitingPayment);
    }
    if paid {
        return Err(StateError::AlreadySettled);
    }
    // Shipped and Delivered cannot be cancelled
    status.ensure_transition(CheckoutStatus::Cancelled)?;
    Ok(Settlement::Apply)
}

fn respond(message: &str, checkout: CheckoutModel) -> ApiResponse<CheckoutWithItems> {
    ApiResponse::success(
        message,
        CheckoutWithItems {
            checkout: checkout.into(),
            items: Vec::new(),
            payment_redirect: None,
        },
        Some(Meta::empty()),
    )
}

pub async fn payment_confirmed(
    state: &AppState,
    checkout_id: Uuid,
    payload: PaymentConfirmedRequest,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    let external_id = payload.external_payment_id.trim();
    if external_id.is_empty() {
        return Err(ValidationError::MissingField("external_payment_id").into());
    }

    let txn = state.orm.begin().await?;
    let checkout = checkout_service::lock_checkout(&txn, checkout_id).await?;
    let status = status_of(&checkout)?;
    let outcome = confirmation_outcome(
        status,
        method_of(&checkout)?,
        checkout.payment,
        checkout.external_payment_id.as_deref(),
        external_id,
    )?;

    if outcome == Settlement::AlreadyApplied {
        txn.commit().await?;
        tracing::debug!(checkout_id = %checkout_id, "payment confirmation replayed");
        return Ok(respond("Payment already confirmed", checkout));
    }

    let now = Utc::now();
    let mut active: CheckoutActive = checkout.into();
    active.payment = Set(true);
    active.paid_at = Set(Some(now.into()));
    active.external_payment_id = Set(Some(external_id.to_string()));
    if status == CheckoutStatus::Pending {
        active.status = Set(CheckoutStatus::Confirmed.as_str().to_string());
    }
    active.updated_at = Set(now.into());
    let checkout = active.update(&txn).await?;
    txn.commit().await?;

    tracing::info!(checkout_id = %checkout.id, external_payment_id = external_id, "payment confirmed");
    audit::record(
        state,
        Some(checkout.user_id),
        "payment_confirmed",
        "checkouts",
        serde_json::json!({ "checkout_id": checkout.id, "external_payment_id": external_id }),
    )
    .await;

    Ok(respond("Payment confirmed", checkout))
}

pub async fn payment_failed(
    state: &AppState,
    checkout_id: Uuid,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    let txn = state.orm.begin().await?;
    let checkout = checkout_service::lock_checkout(&txn, checkout_id).await?;
    let outcome = failure_outcome(
        status_of(&checkout)?,
        method_of(&checkout)?,
        checkout.payment,
    )?;

    if outcome == Settlement::AlreadyApplied {
        txn.commit().await?;
        tracing::debug!(checkout_id = %checkout_id, "payment failure replayed");
        return Ok(respond("Checkout already cancelled", checkout));
    }

    let checkout = checkout_service::cancel_checkout(&txn, checkout).await?;
    txn.commit().await?;

    tracing::warn!(checkout_id = %checkout.id, "payment failed, checkout cancelled");
    audit::record(
        state,
        Some(checkout.user_id),
        "payment_failed",
        "checkouts",
        serde_json::json!({ "checkout_id": checkout.id }),
    )
    .await;

    Ok(respond("Checkout cancelled", checkout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use CheckoutStatus::*;

    #[test]
    fn confirmation_applies_once_per_external_id() {
        assert_eq!(
            confirmation_outcome(Pending, PaymentMethod::Paypal, false, None, "PP-1"),
            Ok(Settlement::Apply)
        );
        assert_eq!(
            confirmation_outcome(Confirmed, PaymentMethod::Paypal, true, Some("PP-1"), "PP-1"),
            Ok(Settlement::AlreadyApplied)
        );
        assert_eq!(
            confirmation_outcome(Confirmed, PaymentMethod::Paypal, true, Some("PP-1"), "PP-2"),
            Err(StateError::AlreadySettled)
        );
    }

    #[test]
    fn confirmation_rejects_cash_and_cancelled_checkouts() {
        assert_eq!(
            confirmation_outcome(Pending, PaymentMethod::Cash, false, None, "X"),
            Err(StateError::NotAwaitingPayment)
        );
        assert_eq!(
            confirmation_outcome(Cancelled, PaymentMethod::SslCommerz, false, None, "X"),
            Err(StateError::CheckoutCancelled)
        );
    }

    #[test]
    fn failure_cancels_unsettled_online_checkouts() {
        assert_eq!(
            failure_outcome(Pending, PaymentMethod::Paypal, false),
            Ok(Settlement::Apply)
        );
        assert_eq!(
            failure_outcome(Cancelled, PaymentMethod::Paypal, false),
            Ok(Settlement::AlreadyApplied)
        );
        assert_eq!(
            failure_outcome(Confirmed, PaymentMethod::Paypal, true),
            Err(StateError::AlreadySettled)
        );
        assert_eq!(
            failure_outcome(Pending, PaymentMethod::Cash, false),
            Err(StateError::NotAwaitingPayment)
        );
        assert!(matches!(
            failure_outcome(Shipped, PaymentMethod::Paypal, false),
            Err(StateError::InvalidTransition { .. })
        ));
    }
}
