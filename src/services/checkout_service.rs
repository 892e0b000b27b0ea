use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    audit, catalog,
    dto::checkout::{
        CheckoutList, CheckoutRequest, CheckoutWithItems, ContactInfo, PaymentRedirect,
        UpdateCheckoutItemRequest, UpdateStatusRequest,
    },
    entity::{
        cart_items::{Column as CartItemCol, Entity as CartItems},
        carts::{ActiveModel as CartActive, Model as CartModel},
        checkout_items::{
            ActiveModel as CheckoutItemActive, Column as ItemCol, Entity as CheckoutItems,
            Model as CheckoutItemModel,
        },
        checkouts::{
            ActiveModel as CheckoutActive, Column as CheckoutCol, Entity as Checkouts,
            Model as CheckoutModel,
        },
    },
    error::{AppError, AppResult, NotFoundError, StateError, ValidationError},
    middleware::auth::{AuthUser, ensure_admin},
    models::{CheckoutStatus, PaymentMethod},
    pricing::{self, LineInput, SHIPPING_SURCHARGE},
    response::{ApiResponse, Meta},
    routes::params::{CheckoutListQuery, SortOrder},
    services::cart_service::{self, CartLineRow},
    state::AppState,
};

pub(crate) fn status_of(checkout: &CheckoutModel) -> AppResult<CheckoutStatus> {
    checkout
        .status
        .parse()
        .map_err(|err: ValidationError| AppError::Internal(err.into()))
}

pub(crate) fn method_of(checkout: &CheckoutModel) -> AppResult<PaymentMethod> {
    checkout
        .payment_method
        .parse()
        .map_err(|err: StateError| AppError::Internal(err.into()))
}

/// `PREFIX-` followed by ten upper-case hex characters.
fn generate_reference(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    let short: String = hex.chars().take(10).collect();
    format!("{prefix}-{}", short.to_uppercase())
}

/// Turns a locked, open cart into a checkout inside `txn`.
///
/// Prices are re-read from the catalog (rows locked) at this moment, the
/// items are frozen into checkout items, stock is decremented and the cart is
/// closed and emptied. A line whose product left the catalog is frozen at a
/// zero price. Nothing is visible to other transactions until the caller
/// commits.
pub async fn finalize(
    txn: &DatabaseTransaction,
    cart: CartModel,
    user_id: Uuid,
    contact: &ContactInfo,
    payment_method: &str,
) -> AppResult<(CheckoutModel, Vec<CheckoutItemModel>)> {
    if cart.paid {
        return Err(StateError::CartAlreadyPaid.into());
    }

    let cart_items = CartItems::find()
        .filter(CartItemCol::CartId.eq(cart.id))
        .order_by_asc(CartItemCol::CreatedAt)
        .order_by_asc(CartItemCol::Id)
        .all(txn)
        .await?;
    if cart_items.is_empty() {
        return Err(StateError::EmptyCart.into());
    }

    let locked =
        catalog::lock_lines(txn, cart_items.iter().map(|i| (i.product_id, i.variant_id))).await?;
    let lines: Vec<CartLineRow> = cart_items
        .into_iter()
        .map(|item| {
            let (product, variant) = locked.get(item.product_id, item.variant_id);
            CartLineRow {
                item,
                product,
                variant,
            }
        })
        .collect();

    let method: PaymentMethod = payment_method.parse()?;

    let inputs: Vec<LineInput> = lines.iter().map(CartLineRow::input).collect();
    let coupon = cart_service::load_coupon(txn, cart.coupon_id).await?;
    let now = Utc::now();
    let totals = pricing::cart_totals(&inputs, coupon.as_ref(), now);
    let discount_percent =
        pricing::effective_discount_percent(totals.subtotal, coupon.as_ref(), now);

    let checkout = CheckoutActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        cart_id: Set(cart.id),
        status: Set(CheckoutStatus::Pending.as_str().to_string()),
        payment_method: Set(method.as_str().to_string()),
        subtotal: Set(totals.subtotal),
        discount_percent: Set(discount_percent),
        shipping: Set(SHIPPING_SURCHARGE),
        total: Set(totals.payable),
        full_name: Set(contact.full_name.trim().to_string()),
        email: Set(contact.email.trim().to_string()),
        country: Set(contact.country.trim().to_string()),
        city: Set(contact.city.trim().to_string()),
        home_city: Set(contact.home_city.trim().to_string()),
        zip_code: Set(contact.zip_code.trim().to_string()),
        phone: Set(contact.phone.trim().to_string()),
        address: Set(contact.address.trim().to_string()),
        // cash is settled on delivery, online methods by the payment provider
        payment: Set(false),
        payment_id: Set(Some(generate_reference("PAY"))),
        invoice_no: Set(Some(generate_reference("INV"))),
        tracking_no: Set(Some(generate_reference("TRK"))),
        external_payment_id: Set(None),
        paid_at: Set(None),
        shipping_date: Set(None),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(txn)
    .await?;

    let mut items = Vec::with_capacity(lines.len());
    for (line, input) in lines.iter().zip(&inputs) {
        let item = CheckoutItemActive {
            id: Set(Uuid::new_v4()),
            checkout_id: Set(checkout.id),
            product_id: Set(line.item.product_id),
            variant_id: Set(line.item.variant_id),
            quantity: Set(line.item.quantity),
            unit_price: Set(catalog::unit_price(line.product.as_ref(), line.variant.as_ref())),
            total_amount: Set(pricing::line_total(input)),
            created_at: NotSet,
            updated_at: NotSet,
        }
        .insert(txn)
        .await?;
        items.push(item);

        // a product gone from the catalog is frozen at zero with no stock to take
        if line.product.is_none() {
            tracing::warn!(cart_id = %cart.id, item_id = %line.item.id, "line without product frozen at zero");
            continue;
        }
        catalog::decrement_stock(
            txn,
            line.product.as_ref(),
            line.variant.as_ref(),
            line.item.quantity,
        )
        .await?;
    }

    CartItems::delete_many()
        .filter(CartItemCol::CartId.eq(cart.id))
        .exec(txn)
        .await?;
    let mut cart: CartActive = cart.into();
    cart.paid = Set(true);
    cart.updated_at = Set(now.into());
    cart.update(txn).await?;

    Ok((checkout, items))
}

pub async fn checkout(
    state: &AppState,
    user: &AuthUser,
    payload: CheckoutRequest,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    payload.contact.validate()?;

    let txn = state.orm.begin().await?;
    let cart = cart_service::lock_open_cart(state, &txn, user.user_id)
        .await?
        .ok_or(StateError::EmptyCart)?;
    let (checkout, items) = finalize(
        &txn,
        cart,
        user.user_id,
        &payload.contact,
        &payload.payment_method,
    )
    .await?;
    txn.commit().await?;

    let method = method_of(&checkout)?;
    tracing::info!(
        checkout_id = %checkout.id,
        cart_id = %checkout.cart_id,
        total = %checkout.total,
        payment_method = %method,
        "checkout created"
    );
    audit::record(
        state,
        Some(user.user_id),
        "checkout",
        "checkouts",
        serde_json::json!({ "checkout_id": checkout.id, "total": checkout.total }),
    )
    .await;

    let payment_redirect = method.is_online().then(|| PaymentRedirect {
        provider: method.to_string(),
        checkout_id: checkout.id,
        payment_id: checkout.payment_id.clone().unwrap_or_default(),
        invoice_no: checkout.invoice_no.clone().unwrap_or_default(),
        amount: checkout.total,
    });
    let message = if payment_redirect.is_some() {
        "Redirecting to payment provider"
    } else {
        "Your checkout has been placed successfully"
    };

    Ok(ApiResponse::success(
        message,
        CheckoutWithItems {
            checkout: checkout.into(),
            items: items.into_iter().map(Into::into).collect(),
            payment_redirect,
        },
        Some(Meta::empty()),
    ))
}

pub async fn list_checkouts(
    state: &AppState,
    user: &AuthUser,
    query: CheckoutListQuery,
) -> AppResult<ApiResponse<CheckoutList>> {
    let (page, limit, offset) = query.pagination().normalize();
    let mut condition = Condition::all().add(CheckoutCol::UserId.eq(user.user_id));
    if let Some(status) = query.status.as_ref().filter(|s| !s.is_empty()) {
        let status: CheckoutStatus = status.parse()?;
        condition = condition.add(CheckoutCol::Status.eq(status.as_str()));
    }

    let mut finder = Checkouts::find().filter(condition);
    finder = match query.sort_order.unwrap_or_default() {
        SortOrder::Asc => finder.order_by_asc(CheckoutCol::CreatedAt),
        SortOrder::Desc => finder.order_by_desc(CheckoutCol::CreatedAt),
    };

    let total = finder.clone().count(&state.orm).await? as i64;
    let items = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(ApiResponse::success(
        "OK",
        CheckoutList { items },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_checkout(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    let checkout = Checkouts::find()
        .filter(
            Condition::all()
                .add(CheckoutCol::UserId.eq(user.user_id))
                .add(CheckoutCol::Id.eq(id)),
        )
        .one(&state.orm)
        .await?
        .ok_or(NotFoundError::Checkout)?;
    let items = load_items(&state.orm, checkout.id).await?;

    Ok(ApiResponse::success(
        "OK",
        CheckoutWithItems {
            checkout: checkout.into(),
            items: items.into_iter().map(Into::into).collect(),
            payment_redirect: None,
        },
        Some(Meta::empty()),
    ))
}

async fn load_items<C: ConnectionTrait>(
    conn: &C,
    checkout_id: Uuid,
) -> AppResult<Vec<CheckoutItemModel>> {
    Ok(CheckoutItems::find()
        .filter(ItemCol::CheckoutId.eq(checkout_id))
        .order_by_asc(ItemCol::CreatedAt)
        .order_by_asc(ItemCol::Id)
        .all(conn)
        .await?)
}

pub(crate) async fn lock_checkout(
    txn: &DatabaseTransaction,
    id: Uuid,
) -> AppResult<CheckoutModel> {
    Ok(Checkouts::find_by_id(id)
        .lock(LockType::Update)
        .one(txn)
        .await?
        .ok_or(NotFoundError::Checkout)?)
}

/// Re-derives `subtotal` and `total` from the checkout's items. Must run in
/// the same transaction as the item change that triggered it.
pub async fn recompute_checkout_totals(
    txn: &DatabaseTransaction,
    checkout: CheckoutModel,
) -> AppResult<(CheckoutModel, Vec<CheckoutItemModel>)> {
    let items = load_items(txn, checkout.id).await?;
    let (subtotal, total) = pricing::checkout_totals(
        items.iter().map(|i| i.total_amount),
        checkout.discount_percent,
        checkout.shipping,
    );

    let mut active: CheckoutActive = checkout.into();
    active.subtotal = Set(subtotal);
    active.total = Set(total);
    active.updated_at = Set(Utc::now().into());
    let checkout = active.update(txn).await?;
    Ok((checkout, items))
}

/// Cancels a checkout and gives the stock its items reserved back.
pub(crate) async fn cancel_checkout(
    txn: &DatabaseTransaction,
    checkout: CheckoutModel,
) -> AppResult<CheckoutModel> {
    let items = load_items(txn, checkout.id).await?;
    catalog::lock_lines(txn, items.iter().map(|i| (i.product_id, i.variant_id))).await?;
    for item in items {
        catalog::release_stock(txn, item.product_id, item.variant_id, item.quantity).await?;
    }
    let mut active: CheckoutActive = checkout.into();
    active.status = Set(CheckoutStatus::Cancelled.as_str().to_string());
    active.updated_at = Set(Utc::now().into());
    Ok(active.update(txn).await?)
}

pub async fn update_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateStatusRequest,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    ensure_admin(user)?;
    let next: CheckoutStatus = payload.status.parse()?;

    let txn = state.orm.begin().await?;
    let checkout = lock_checkout(&txn, id).await?;
    let current = status_of(&checkout)?;
    current.ensure_transition(next)?;

    let checkout = match next {
        CheckoutStatus::Cancelled => cancel_checkout(&txn, checkout).await?,
        _ => {
            let mut active: CheckoutActive = checkout.into();
            active.status = Set(next.as_str().to_string());
            if next == CheckoutStatus::Shipped {
                active.shipping_date = Set(Some(Utc::now().into()));
            }
            active.updated_at = Set(Utc::now().into());
            active.update(&txn).await?
        }
    };
    let items = load_items(&txn, checkout.id).await?;
    txn.commit().await?;

    tracing::info!(checkout_id = %checkout.id, from = %current, to = %next, "checkout status changed");
    audit::record(
        state,
        Some(user.user_id),
        "checkout_status_update",
        "checkouts",
        serde_json::json!({ "checkout_id": checkout.id, "from": current.as_str(), "to": next.as_str() }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout updated",
        CheckoutWithItems {
            checkout: checkout.into(),
            items: items.into_iter().map(Into::into).collect(),
            payment_redirect: None,
        },
        Some(Meta::empty()),
    ))
}

async fn lock_editable(txn: &DatabaseTransaction, checkout_id: Uuid) -> AppResult<CheckoutModel> {
    let checkout = lock_checkout(txn, checkout_id).await?;
    if status_of(&checkout)? != CheckoutStatus::Pending || checkout.payment {
        return Err(StateError::CheckoutNotEditable.into());
    }
    Ok(checkout)
}

async fn find_item(
    txn: &DatabaseTransaction,
    checkout_id: Uuid,
    item_id: Uuid,
) -> AppResult<CheckoutItemModel> {
    Ok(CheckoutItems::find()
        .filter(ItemCol::Id.eq(item_id))
        .filter(ItemCol::CheckoutId.eq(checkout_id))
        .one(txn)
        .await?
        .ok_or(NotFoundError::CheckoutItem)?)
}

pub async fn update_item_quantity(
    state: &AppState,
    user: &AuthUser,
    checkout_id: Uuid,
    item_id: Uuid,
    payload: UpdateCheckoutItemRequest,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    ensure_admin(user)?;
    if payload.quantity <= 0 {
        return Err(ValidationError::InvalidQuantity.into());
    }

    let txn = state.orm.begin().await?;
    let checkout = lock_editable(&txn, checkout_id).await?;
    let item = find_item(&txn, checkout.id, item_id).await?;

    let delta = payload.quantity - item.quantity;
    let locked = catalog::lock_lines(&txn, [(item.product_id, item.variant_id)]).await?;
    if delta > 0 {
        let (product, variant) = locked.get(item.product_id, item.variant_id);
        catalog::decrement_stock(&txn, product.as_ref(), variant.as_ref(), delta).await?;
    } else if delta < 0 {
        catalog::release_stock(&txn, item.product_id, item.variant_id, -delta).await?;
    }

    let total_amount = pricing::money(item.unit_price * Decimal::from(payload.quantity));
    let mut active: CheckoutItemActive = item.into();
    active.quantity = Set(payload.quantity);
    active.total_amount = Set(total_amount);
    active.updated_at = Set(Utc::now().into());
    active.update(&txn).await?;

    let (checkout, items) = recompute_checkout_totals(&txn, checkout).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "checkout_item_update",
        "checkout_items",
        serde_json::json!({ "checkout_id": checkout.id, "item_id": item_id, "quantity": payload.quantity }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout item updated",
        CheckoutWithItems {
            checkout: checkout.into(),
            items: items.into_iter().map(Into::into).collect(),
            payment_redirect: None,
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    checkout_id: Uuid,
    item_id: Uuid,
) -> AppResult<ApiResponse<CheckoutWithItems>> {
    ensure_admin(user)?;

    let txn = state.orm.begin().await?;
    let checkout = lock_editable(&txn, checkout_id).await?;
    let item = find_item(&txn, checkout.id, item_id).await?;

    catalog::release_stock(&txn, item.product_id, item.variant_id, item.quantity).await?;
    CheckoutItems::delete_by_id(item.id).exec(&txn).await?;

    let (checkout, items) = recompute_checkout_totals(&txn, checkout).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "checkout_item_remove",
        "checkout_items",
        serde_json::json!({ "checkout_id": checkout.id, "item_id": item_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Checkout item removed",
        CheckoutWithItems {
            checkout: checkout.into(),
            items: items.into_iter().map(Into::into).collect(),
            payment_redirect: None,
        },
        Some(Meta::empty()),
    ))
}
