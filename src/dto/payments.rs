use serde::Deserialize;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct PaymentConfirmedRequest {
    pub external_payment_id: String,
}
