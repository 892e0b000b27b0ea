use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    entity::{
        cart_items::Model as CartItemModel, checkout_items::Model as CheckoutItemModel,
        checkouts::Model as CheckoutModel, coupons::Model as CouponModel,
    },
    error::{StateError, ValidationError},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Coupon {
    pub id: Uuid,
    pub code: String,
    /// Percentage off, 0 to 100.
    pub discount: Decimal,
    pub minimum_amount: Decimal,
    pub is_expired: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl From<CouponModel> for Coupon {
    fn from(model: CouponModel) -> Self {
        Self {
            id: model.id,
            code: model.code,
            discount: model.discount,
            minimum_amount: model.minimum_amount,
            is_expired: model.is_expired,
            start_date: model.start_date.map(|dt| dt.with_timezone(&Utc)),
            end_date: model.end_date.map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl From<CartItemModel> for CartItem {
    fn from(model: CartItemModel) -> Self {
        Self {
            id: model.id,
            cart_id: model.cart_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            quantity: model.quantity,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum CheckoutStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutStatus::Pending => "Pending",
            CheckoutStatus::Confirmed => "Confirmed",
            CheckoutStatus::Shipped => "Shipped",
            CheckoutStatus::Delivered => "Delivered",
            CheckoutStatus::Cancelled => "Cancelled",
        }
    }

    pub fn can_transition_to(&self, next: CheckoutStatus) -> bool {
        use CheckoutStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, Cancelled)
                | (Confirmed, Shipped)
                | (Confirmed, Cancelled)
                | (Shipped, Delivered)
        )
    }

    pub fn ensure_transition(&self, next: CheckoutStatus) -> Result<(), StateError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(StateError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckoutStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(CheckoutStatus::Pending),
            "Confirmed" => Ok(CheckoutStatus::Confirmed),
            "Shipped" => Ok(CheckoutStatus::Shipped),
            "Delivered" => Ok(CheckoutStatus::Delivered),
            "Cancelled" => Ok(CheckoutStatus::Cancelled),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    Cash,
    Paypal,
    #[serde(rename = "SSLCommerz")]
    SslCommerz,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Paypal => "Paypal",
            PaymentMethod::SslCommerz => "SSLCommerz",
        }
    }

    /// Online methods settle only once the payment provider confirms.
    pub fn is_online(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Cash" => Ok(PaymentMethod::Cash),
            "Paypal" => Ok(PaymentMethod::Paypal),
            "SSLCommerz" => Ok(PaymentMethod::SslCommerz),
            other => Err(StateError::InvalidPaymentMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Checkout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub cart_id: Uuid,
    pub status: String,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub discount_percent: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
    pub full_name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub home_city: String,
    pub zip_code: String,
    pub phone: String,
    pub address: String,
    pub payment: bool,
    pub payment_id: Option<String>,
    pub invoice_no: Option<String>,
    pub tracking_no: Option<String>,
    pub external_payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub shipping_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CheckoutModel> for Checkout {
    fn from(model: CheckoutModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            cart_id: model.cart_id,
            status: model.status,
            payment_method: model.payment_method,
            subtotal: model.subtotal,
            discount_percent: model.discount_percent,
            shipping: model.shipping,
            total: model.total,
            full_name: model.full_name,
            email: model.email,
            country: model.country,
            city: model.city,
            home_city: model.home_city,
            zip_code: model.zip_code,
            phone: model.phone,
            address: model.address,
            payment: model.payment,
            payment_id: model.payment_id,
            invoice_no: model.invoice_no,
            tracking_no: model.tracking_no,
            external_payment_id: model.external_payment_id,
            paid_at: model.paid_at.map(|dt| dt.with_timezone(&Utc)),
            shipping_date: model.shipping_date.map(|dt| dt.with_timezone(&Utc)),
            created_at: model.created_at.with_timezone(&Utc),
            updated_at: model.updated_at.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutItem {
    pub id: Uuid,
    pub checkout_id: Uuid,
    pub product_id: Option<Uuid>,
    pub variant_id: Option<Uuid>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

impl From<CheckoutItemModel> for CheckoutItem {
    fn from(model: CheckoutItemModel) -> Self {
        Self {
            id: model.id,
            checkout_id: model.checkout_id,
            product_id: model.product_id,
            variant_id: model.variant_id,
            quantity: model.quantity,
            unit_price: model.unit_price,
            total_amount: model.total_amount,
            created_at: model.created_at.with_timezone(&Utc),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_machine_allows_forward_paths_only() {
        use CheckoutStatus::*;
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));

        assert!(!Pending.can_transition_to(Shipped));
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Shipped.can_transition_to(Pending));
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = CheckoutStatus::Cancelled
            .ensure_transition(CheckoutStatus::Confirmed)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot move checkout from Cancelled to Confirmed");
    }

    #[test]
    fn payment_methods_parse_from_recognized_names() {
        assert_eq!("Cash".parse::<PaymentMethod>(), Ok(PaymentMethod::Cash));
        assert_eq!(
            "SSLCommerz".parse::<PaymentMethod>(),
            Ok(PaymentMethod::SslCommerz)
        );
        assert_eq!(
            "Bitcoin".parse::<PaymentMethod>(),
            Err(StateError::InvalidPaymentMethod("Bitcoin".into()))
        );
        assert!(!PaymentMethod::Cash.is_online());
        assert!(PaymentMethod::Paypal.is_online());
    }
}
