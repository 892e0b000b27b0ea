use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::ValidationError,
    models::{Checkout, CheckoutItem},
};

/// Shipping and contact details frozen into the checkout.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ContactInfo {
    pub full_name: String,
    pub email: String,
    pub country: String,
    pub city: String,
    pub home_city: String,
    pub zip_code: String,
    pub phone: String,
    pub address: String,
}

impl ContactInfo {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let fields = [
            ("full_name", &self.full_name),
            ("email", &self.email),
            ("country", &self.country),
            ("city", &self.city),
            ("home_city", &self.home_city),
            ("zip_code", &self.zip_code),
            ("phone", &self.phone),
            ("address", &self.address),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(ValidationError::MissingField(*name)),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    #[serde(flatten)]
    pub contact: ContactInfo,
    pub payment_method: String,
}

/// Where the client has to send the buyer to pay an online checkout.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentRedirect {
    pub provider: String,
    pub checkout_id: Uuid,
    pub payment_id: String,
    pub invoice_no: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutWithItems {
    pub checkout: Checkout,
    pub items: Vec<CheckoutItem>,
    pub payment_redirect: Option<PaymentRedirect>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckoutList {
    pub items: Vec<Checkout>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCheckoutItemRequest {
    pub quantity: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> ContactInfo {
        ContactInfo {
            full_name: "Ada Lovelace".into(),
            email: "ada@example.com".into(),
            country: "UK".into(),
            city: "London".into(),
            home_city: "Marylebone".into(),
            zip_code: "NW1".into(),
            phone: "+44000000".into(),
            address: "12 St James's Square".into(),
        }
    }

    #[test]
    fn complete_contact_is_valid() {
        assert_eq!(contact().validate(), Ok(()));
    }

    #[test]
    fn blank_field_is_reported_by_name() {
        let mut c = contact();
        c.zip_code = "   ".into();
        assert_eq!(c.validate(), Err(ValidationError::MissingField("zip_code")));
    }
}
