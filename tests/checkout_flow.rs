mod common;

use cart_checkout_api::{
    dto::{
        cart::AddToCartRequest,
        checkout::{CheckoutRequest, ContactInfo, UpdateCheckoutItemRequest, UpdateStatusRequest},
        payments::PaymentConfirmedRequest,
    },
    error::{AppError, StateError},
    middleware::auth::AuthUser,
    routes::params::CheckoutListQuery,
    services::{cart_service, checkout_service, payment_service},
    state::AppState,
};
use rust_decimal::Decimal;
use uuid::Uuid;

fn contact() -> ContactInfo {
    ContactInfo {
        full_name: "Rafi Ahmed".into(),
        email: "rafi@example.com".into(),
        country: "Bangladesh".into(),
        city: "Dhaka".into(),
        home_city: "Mirpur".into(),
        zip_code: "1216".into(),
        phone: "+8801700000000".into(),
        address: "House 7, Road 3".into(),
    }
}

fn request(payment_method: &str) -> CheckoutRequest {
    CheckoutRequest {
        contact: contact(),
        payment_method: payment_method.into(),
    }
}

async fn add(state: &AppState, user: &AuthUser, product_id: Uuid, quantity: i32) -> anyhow::Result<()> {
    cart_service::add_to_cart(
        state,
        user,
        AddToCartRequest {
            product_id,
            size_id: None,
            color_id: None,
            quantity,
        },
    )
    .await?;
    Ok(())
}

#[tokio::test]
async fn cash_checkout_freezes_items_and_closes_cart() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let tee = common::create_product(&state, 500, 10).await?;
    let tote = common::create_product(&state, 250, 5).await?;
    add(&state, &user, tee, 2).await?;
    add(&state, &user, tote, 1).await?;

    let placed = checkout_service::checkout(&state, &user, request("Cash"))
        .await?
        .data
        .expect("checkout");
    assert_eq!(placed.checkout.status, "Pending");
    assert!(!placed.checkout.payment);
    assert!(placed.payment_redirect.is_none());
    assert_eq!(placed.items.len(), 2);
    assert_eq!(placed.checkout.subtotal, Decimal::from(1250));
    assert_eq!(placed.checkout.total, Decimal::from(1400));
    let frozen: Decimal = placed.items.iter().map(|i| i.total_amount).sum();
    assert_eq!(frozen, placed.checkout.subtotal);
    assert!(placed.checkout.invoice_no.as_deref().is_some_and(|n| n.starts_with("INV-")));

    assert_eq!(common::product_stock(&state, tee).await?, 8);
    assert_eq!(common::product_stock(&state, tote).await?, 4);

    // the cart is closed, so the next view starts empty
    let view = cart_service::view_cart(&state, &user)
        .await?
        .data
        .expect("cart view");
    assert!(view.items.is_empty());

    let err = checkout_service::checkout(&state, &user, request("Cash"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::State(StateError::EmptyCart)));

    let history = checkout_service::list_checkouts(&state, &user, CheckoutListQuery::default())
        .await?
        .data
        .expect("history");
    assert_eq!(history.items.len(), 1);
    Ok(())
}

#[tokio::test]
async fn unknown_payment_method_leaves_cart_intact() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let product_id = common::create_product(&state, 500, 10).await?;
    add(&state, &user, product_id, 1).await?;

    let err = checkout_service::checkout(&state, &user, request("Bitcoin"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::State(StateError::InvalidPaymentMethod(_))
    ));

    let view = cart_service::view_cart(&state, &user)
        .await?
        .data
        .expect("cart view");
    assert_eq!(view.items.len(), 1);
    assert_eq!(common::product_stock(&state, product_id).await?, 10);
    Ok(())
}

#[tokio::test]
async fn online_payment_confirmation_is_idempotent() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let product_id = common::create_product(&state, 500, 10).await?;
    add(&state, &user, product_id, 1).await?;

    let placed = checkout_service::checkout(&state, &user, request("Paypal"))
        .await?
        .data
        .expect("checkout");
    let redirect = placed.payment_redirect.expect("payment redirect");
    assert_eq!(redirect.provider, "Paypal");
    assert_eq!(redirect.amount, Decimal::from(650));
    let checkout_id = placed.checkout.id;

    let external = format!("PP-{}", Uuid::new_v4().simple());
    for _ in 0..2 {
        let confirmed = payment_service::payment_confirmed(
            &state,
            checkout_id,
            PaymentConfirmedRequest {
                external_payment_id: external.clone(),
            },
        )
        .await?
        .data
        .expect("confirmation");
        assert!(confirmed.checkout.payment);
        assert_eq!(confirmed.checkout.status, "Confirmed");
        assert_eq!(confirmed.checkout.external_payment_id.as_deref(), Some(external.as_str()));
    }

    let err = payment_service::payment_confirmed(
        &state,
        checkout_id,
        PaymentConfirmedRequest {
            external_payment_id: "PP-other".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::State(StateError::AlreadySettled)));

    let fetched = checkout_service::get_checkout(&state, &user, checkout_id)
        .await?
        .data
        .expect("checkout");
    assert_eq!(fetched.items.len(), 1);
    assert_eq!(common::product_stock(&state, product_id).await?, 9);
    Ok(())
}

#[tokio::test]
async fn payment_failure_cancels_and_restocks() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let product_id = common::create_product(&state, 500, 10).await?;
    add(&state, &user, product_id, 3).await?;

    let placed = checkout_service::checkout(&state, &user, request("SSLCommerz"))
        .await?
        .data
        .expect("checkout");
    assert_eq!(common::product_stock(&state, product_id).await?, 7);

    for _ in 0..2 {
        let failed = payment_service::payment_failed(&state, placed.checkout.id)
            .await?
            .data
            .expect("failure");
        assert_eq!(failed.checkout.status, "Cancelled");
    }
    assert_eq!(common::product_stock(&state, product_id).await?, 10);

    let err = payment_service::payment_confirmed(
        &state,
        placed.checkout.id,
        PaymentConfirmedRequest {
            external_payment_id: "late".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::State(StateError::CheckoutCancelled)));
    Ok(())
}

#[tokio::test]
async fn admin_item_edit_recomputes_totals_and_stock() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let admin = common::admin();
    let product_id = common::create_product(&state, 500, 10).await?;
    add(&state, &user, product_id, 2).await?;

    let placed = checkout_service::checkout(&state, &user, request("Cash"))
        .await?
        .data
        .expect("checkout");
    let item_id = placed.items[0].id;

    let forbidden = checkout_service::update_item_quantity(
        &state,
        &user,
        placed.checkout.id,
        item_id,
        UpdateCheckoutItemRequest { quantity: 3 },
    )
    .await
    .unwrap_err();
    assert!(matches!(forbidden, AppError::Forbidden));

    let edited = checkout_service::update_item_quantity(
        &state,
        &admin,
        placed.checkout.id,
        item_id,
        UpdateCheckoutItemRequest { quantity: 3 },
    )
    .await?
    .data
    .expect("edited checkout");
    assert_eq!(edited.items[0].total_amount, Decimal::from(1500));
    assert_eq!(edited.checkout.subtotal, Decimal::from(1500));
    assert_eq!(edited.checkout.total, Decimal::from(1650));
    assert_eq!(common::product_stock(&state, product_id).await?, 7);

    let shipped_early = checkout_service::update_status(
        &state,
        &admin,
        placed.checkout.id,
        UpdateStatusRequest {
            status: "Shipped".into(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        shipped_early,
        AppError::State(StateError::InvalidTransition { .. })
    ));

    let confirmed = checkout_service::update_status(
        &state,
        &admin,
        placed.checkout.id,
        UpdateStatusRequest {
            status: "Confirmed".into(),
        },
    )
    .await?
    .data
    .expect("confirmed checkout");
    assert_eq!(confirmed.checkout.status, "Confirmed");

    let locked = checkout_service::remove_item(&state, &admin, placed.checkout.id, item_id)
        .await
        .unwrap_err();
    assert!(matches!(
        locked,
        AppError::State(StateError::CheckoutNotEditable)
    ));
    Ok(())
}

#[tokio::test]
async fn line_of_deleted_product_is_frozen_at_zero() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let kept = common::create_product(&state, 500, 10).await?;
    let gone = common::create_product(&state, 300, 10).await?;
    add(&state, &user, kept, 1).await?;
    add(&state, &user, gone, 2).await?;
    common::delete_product(&state, gone).await?;

    let placed = checkout_service::checkout(&state, &user, request("Cash"))
        .await?
        .data
        .expect("checkout");
    assert_eq!(placed.items.len(), 2);
    let phantom = placed
        .items
        .iter()
        .find(|i| i.product_id.is_none())
        .expect("zero-priced line");
    assert_eq!(phantom.quantity, 2);
    assert_eq!(phantom.unit_price, Decimal::ZERO);
    assert_eq!(phantom.total_amount, Decimal::ZERO);
    assert_eq!(placed.checkout.subtotal, Decimal::from(500));
    assert_eq!(placed.checkout.total, Decimal::from(650));
    assert_eq!(common::product_stock(&state, kept).await?, 9);
    Ok(())
}

#[tokio::test]
async fn cart_of_only_deleted_products_still_checks_out() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let user = common::user();
    let gone = common::create_product(&state, 300, 10).await?;
    add(&state, &user, gone, 1).await?;
    common::delete_product(&state, gone).await?;

    let placed = checkout_service::checkout(&state, &user, request("Cash"))
        .await?
        .data
        .expect("checkout");
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.checkout.subtotal, Decimal::ZERO);
    assert_eq!(placed.checkout.total, Decimal::from(150));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn opposite_order_carts_check_out_concurrently() -> anyhow::Result<()> {
    let Some(state) = common::setup_state().await? else {
        return Ok(());
    };
    let mut products = Vec::new();
    for _ in 0..15 {
        products.push(common::create_product(&state, 100, 10).await?);
    }

    for _ in 0..3 {
        let first = common::user();
        let second = common::user();
        for (a, b) in products.iter().zip(products.iter().rev()) {
            add(&state, &first, *a, 1).await?;
            add(&state, &second, *b, 1).await?;
        }

        let (left, right) = tokio::join!(
            checkout_service::checkout(&state, &first, request("Cash")),
            checkout_service::checkout(&state, &second, request("Cash")),
        );
        assert_eq!(left?.data.expect("checkout").items.len(), 15);
        assert_eq!(right?.data.expect("checkout").items.len(), 15);
    }

    for product_id in products {
        assert_eq!(common::product_stock(&state, product_id).await?, 4);
    }
    Ok(())
}
