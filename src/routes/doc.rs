use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        cart::{
            AddToCartRequest, AddToCartResponse, AdjustQuantityRequest, AdjustQuantityResponse,
            ApplyCouponRequest, CartLine, CartView, Direction,
        },
        checkout::{
            CheckoutList, CheckoutRequest, CheckoutWithItems, ContactInfo, PaymentRedirect,
            UpdateCheckoutItemRequest, UpdateStatusRequest,
        },
        payments::PaymentConfirmedRequest,
    },
    middleware::auth::PAYMENT_TOKEN_HEADER,
    models::{CartItem, Checkout, CheckoutItem, CheckoutStatus, PaymentMethod},
    pricing::CartTotals,
    response::{ApiResponse, Meta},
    routes::{admin, cart, checkouts, health, params, payments},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "payment_token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(PAYMENT_TOKEN_HEADER))),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        cart::view_cart,
        cart::add_to_cart,
        cart::adjust_quantity,
        cart::remove_from_cart,
        cart::apply_coupon,
        checkouts::checkout,
        checkouts::list_checkouts,
        checkouts::get_checkout,
        payments::payment_confirmed,
        payments::payment_failed,
        admin::update_checkout_status,
        admin::update_checkout_item,
        admin::remove_checkout_item
    ),
    components(
        schemas(
            CartItem,
            Checkout,
            CheckoutItem,
            CheckoutStatus,
            PaymentMethod,
            CartTotals,
            AddToCartRequest,
            AddToCartResponse,
            AdjustQuantityRequest,
            AdjustQuantityResponse,
            ApplyCouponRequest,
            CartLine,
            CartView,
            Direction,
            ContactInfo,
            CheckoutRequest,
            CheckoutWithItems,
            CheckoutList,
            PaymentRedirect,
            UpdateStatusRequest,
            UpdateCheckoutItemRequest,
            PaymentConfirmedRequest,
            params::Pagination,
            params::SortOrder,
            Meta,
            ApiResponse<CartView>,
            ApiResponse<CartTotals>,
            ApiResponse<CheckoutWithItems>,
            ApiResponse<CheckoutList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Cart", description = "Open cart of the current user"),
        (name = "Checkouts", description = "Checkout and order history"),
        (name = "Payments", description = "Payment provider callbacks"),
        (name = "Admin", description = "Back-office checkout management"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_payment_callbacks() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/payments/{checkout_id}/confirmed"));
        assert!(doc.paths.paths.contains_key("/api/cart/items/{id}"));
        let schemes = doc.components.expect("components").security_schemes;
        assert!(schemes.contains_key("payment_token"));
    }
}
