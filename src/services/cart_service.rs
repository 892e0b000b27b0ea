use std::collections::HashMap;

use chrono::Utc;
use sea_orm::ActiveValue::NotSet;
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, Statement, TransactionTrait, Value,
};
use uuid::Uuid;

use crate::{
    audit,
    catalog::{self, VariantSelector},
    coupon,
    dto::cart::{
        AddToCartRequest, AddToCartResponse, AdjustQuantityRequest, AdjustQuantityResponse,
        ApplyCouponRequest, CartLine, CartView, Direction,
    },
    entity::{
        cart_items::{ActiveModel as CartItemActive, Column as ItemCol, Entity as CartItems, Model as CartItemModel},
        carts::{ActiveModel as CartActive, Column as CartCol, Entity as Carts, Model as CartModel},
        coupons::{Column as CouponCol, Entity as Coupons},
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        variants::{Column as VarCol, Entity as Variants, Model as VariantModel},
    },
    error::{AppError, AppResult, CouponError, NotFoundError, StockError, ValidationError},
    middleware::auth::AuthUser,
    models::Coupon,
    pricing::{self, CartTotals, LineInput},
    response::{ApiResponse, Meta},
    state::AppState,
};

/// A cart item together with the catalog rows that price it.
#[derive(Debug, Clone)]
pub struct CartLineRow {
    pub item: CartItemModel,
    pub product: Option<ProductModel>,
    pub variant: Option<VariantModel>,
}

impl CartLineRow {
    pub fn input(&self) -> LineInput {
        catalog::line_input(self.item.quantity, self.product.as_ref(), self.variant.as_ref())
    }
}

/// Quantity of a line after adding `requested` units to `existing`.
pub fn quantity_after_add(
    existing: Option<i32>,
    requested: i32,
    max_stock: i32,
) -> Result<i32, AppError> {
    if requested <= 0 {
        return Err(ValidationError::InvalidQuantity.into());
    }
    if max_stock <= 0 {
        return Err(StockError::OutOfStock.into());
    }
    let quantity = existing.unwrap_or(0).saturating_add(requested);
    if quantity > max_stock {
        return Err(StockError::StockExceeded { max_stock }.into());
    }
    Ok(quantity)
}

/// Quantity of a line after a one-unit step. Never reaches zero; removal is
/// a separate operation.
pub fn quantity_after_adjust(
    current: i32,
    direction: Direction,
    max_stock: i32,
) -> Result<i32, AppError> {
    match direction {
        Direction::Increase if current >= max_stock => {
            Err(StockError::StockExceeded { max_stock }.into())
        }
        Direction::Increase => Ok(current + 1),
        Direction::Decrease if current <= 1 => Err(ValidationError::MinimumQuantity.into()),
        Direction::Decrease => Ok(current - 1),
    }
}

/// The user's open cart, created if missing, locked for the rest of `txn`.
///
/// Creation goes through the `carts_one_open_per_user` unique index: a
/// concurrent creator blocks on it and then reuses the winner's row.
pub async fn get_or_create_open_cart(
    state: &AppState,
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> AppResult<CartModel> {
    txn.execute(Statement::from_sql_and_values(
        txn.get_database_backend(),
        r#"
        INSERT INTO carts (id, user_id, paid)
        VALUES ($1, $2, FALSE)
        ON CONFLICT (user_id) WHERE paid = FALSE DO NOTHING
        "#,
        [Value::from(Uuid::new_v4()), Value::from(user_id)],
    ))
    .await?;

    lock_open_cart(state, txn, user_id)
        .await?
        .ok_or_else(|| NotFoundError::Cart.into())
}

/// Locks and returns the user's open cart, if any.
pub async fn lock_open_cart(
    state: &AppState,
    txn: &DatabaseTransaction,
    user_id: Uuid,
) -> AppResult<Option<CartModel>> {
    let carts = Carts::find()
        .filter(CartCol::UserId.eq(user_id))
        .filter(CartCol::Paid.eq(false))
        .order_by_asc(CartCol::Id)
        .lock(LockType::Update)
        .all(txn)
        .await?;

    if carts.len() > 1 {
        report_open_cart_inconsistency(state, user_id, &carts).await;
    }
    Ok(carts.into_iter().next())
}

/// Logs and audits a user holding several open carts. The audit row is
/// written on its own pool connection, so it survives even if the caller's
/// cart transaction later rolls back.
async fn report_open_cart_inconsistency(state: &AppState, user_id: Uuid, carts: &[CartModel]) {
    let ids: Vec<Uuid> = carts.iter().map(|c| c.id).collect();
    tracing::error!(
        user_id = %user_id,
        open_carts = ?ids,
        "more than one open cart; using the lowest id"
    );
    audit::record(
        state,
        Some(user_id),
        "open_cart_inconsistency",
        "carts",
        serde_json::json!({ "cart_ids": ids }),
    )
    .await;
}

/// Items of a cart, oldest first, with their product and variant rows.
pub async fn load_lines<C: ConnectionTrait>(conn: &C, cart_id: Uuid) -> AppResult<Vec<CartLineRow>> {
    let items = CartItems::find()
        .filter(ItemCol::CartId.eq(cart_id))
        .order_by_asc(ItemCol::CreatedAt)
        .order_by_asc(ItemCol::Id)
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().filter_map(|i| i.product_id).collect();
    let variant_ids: Vec<Uuid> = items.iter().filter_map(|i| i.variant_id).collect();

    let products: HashMap<Uuid, ProductModel> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };
    let variants: HashMap<Uuid, VariantModel> = if variant_ids.is_empty() {
        HashMap::new()
    } else {
        Variants::find()
            .filter(VarCol::Id.is_in(variant_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect()
    };

    Ok(items
        .into_iter()
        .map(|item| CartLineRow {
            product: item.product_id.and_then(|id| products.get(&id).cloned()),
            variant: item.variant_id.and_then(|id| variants.get(&id).cloned()),
            item,
        })
        .collect())
}

pub async fn load_coupon<C: ConnectionTrait>(
    conn: &C,
    coupon_id: Option<Uuid>,
) -> AppResult<Option<Coupon>> {
    let Some(id) = coupon_id else {
        return Ok(None);
    };
    Ok(Coupons::find_by_id(id).one(conn).await?.map(Coupon::from))
}

async fn totals_for<C: ConnectionTrait>(conn: &C, cart: &CartModel) -> AppResult<CartTotals> {
    let lines = load_lines(conn, cart.id).await?;
    let inputs: Vec<LineInput> = lines.iter().map(CartLineRow::input).collect();
    let coupon = load_coupon(conn, cart.coupon_id).await?;
    Ok(pricing::cart_totals(&inputs, coupon.as_ref(), Utc::now()))
}

pub async fn view_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartView>> {
    let cart = Carts::find()
        .filter(CartCol::UserId.eq(user.user_id))
        .filter(CartCol::Paid.eq(false))
        .order_by_asc(CartCol::Id)
        .one(&state.orm)
        .await?;

    let Some(cart) = cart else {
        let view = CartView {
            cart_id: None,
            coupon_code: None,
            items: Vec::new(),
            totals: CartTotals::empty(),
        };
        return Ok(ApiResponse::success("OK", view, Some(Meta::empty())));
    };

    let lines = load_lines(&state.orm, cart.id).await?;
    let coupon = load_coupon(&state.orm, cart.coupon_id).await?;
    let inputs: Vec<LineInput> = lines.iter().map(CartLineRow::input).collect();
    let totals = pricing::cart_totals(&inputs, coupon.as_ref(), Utc::now());

    let items = lines
        .iter()
        .zip(&inputs)
        .map(|(line, input)| CartLine {
            id: line.item.id,
            product_id: line.item.product_id,
            variant_id: line.item.variant_id,
            quantity: line.item.quantity,
            unit_price: input.unit_price().unwrap_or_default(),
            line_total: pricing::line_total(input),
        })
        .collect();

    let view = CartView {
        cart_id: Some(cart.id),
        coupon_code: coupon.map(|c| c.code),
        items,
        totals,
    };
    Ok(ApiResponse::success("OK", view, Some(Meta::empty())))
}

pub async fn add_to_cart(
    state: &AppState,
    user: &AuthUser,
    payload: AddToCartRequest,
) -> AppResult<ApiResponse<AddToCartResponse>> {
    if payload.quantity <= 0 {
        return Err(ValidationError::InvalidQuantity.into());
    }

    let txn = state.orm.begin().await?;
    let cart = get_or_create_open_cart(state, &txn, user.user_id).await?;

    let product = catalog::get_product(&txn, payload.product_id)
        .await?
        .ok_or(NotFoundError::Product)?;
    let selector = VariantSelector {
        size_id: payload.size_id,
        color_id: payload.color_id,
    };
    let variant = catalog::get_variant(&txn, product.id, selector).await?;
    if selector.is_specified() && variant.is_none() {
        return Err(NotFoundError::Variant.into());
    }
    let variant_id = variant.as_ref().map(|v| v.id);
    let max_stock = catalog::max_stock(Some(&product), variant.as_ref());

    let same_variant = match variant_id {
        Some(id) => ItemCol::VariantId.eq(id),
        None => ItemCol::VariantId.is_null(),
    };
    let existing = CartItems::find()
        .filter(ItemCol::CartId.eq(cart.id))
        .filter(ItemCol::ProductId.eq(product.id))
        .filter(same_variant)
        .order_by_asc(ItemCol::Id)
        .one(&txn)
        .await?;

    let quantity =
        quantity_after_add(existing.as_ref().map(|i| i.quantity), payload.quantity, max_stock)?;

    let (cart_item, message) = match existing {
        Some(item) => {
            let mut active: CartItemActive = item.into();
            active.quantity = Set(quantity);
            active.updated_at = Set(Utc::now().into());
            (active.update(&txn).await?, "Quantity updated successfully")
        }
        None => {
            let item = CartItemActive {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart.id),
                product_id: Set(Some(product.id)),
                variant_id: Set(variant_id),
                quantity: Set(quantity),
                created_at: NotSet,
                updated_at: NotSet,
            }
            .insert(&txn)
            .await?;
            (item, "Item added to cart successfully")
        }
    };

    let totals = totals_for(&txn, &cart).await?;
    txn.commit().await?;

    tracing::debug!(cart_id = %cart.id, item_id = %cart_item.id, quantity, "cart item saved");
    audit::record(
        state,
        Some(user.user_id),
        "cart_add",
        "cart_items",
        serde_json::json!({
            "cart_id": cart.id,
            "product_id": product.id,
            "variant_id": variant_id,
            "quantity": quantity,
        }),
    )
    .await;

    Ok(ApiResponse::success(
        message,
        AddToCartResponse {
            cart_item: cart_item.into(),
            totals,
        },
        Some(Meta::empty()),
    ))
}

pub async fn adjust_quantity(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: AdjustQuantityRequest,
) -> AppResult<ApiResponse<AdjustQuantityResponse>> {
    let txn = state.orm.begin().await?;
    let cart = lock_open_cart(state, &txn, user.user_id)
        .await?
        .ok_or(NotFoundError::CartItem)?;

    let item = CartItems::find()
        .filter(ItemCol::Id.eq(item_id))
        .filter(ItemCol::CartId.eq(cart.id))
        .one(&txn)
        .await?
        .ok_or(NotFoundError::CartItem)?;

    let product = match item.product_id {
        Some(id) => catalog::get_product(&txn, id).await?,
        None => None,
    };
    let variant = match item.variant_id {
        Some(id) => catalog::get_variant_by_id(&txn, id).await?,
        None => None,
    };
    let max_stock = catalog::max_stock(product.as_ref(), variant.as_ref());
    let quantity = quantity_after_adjust(item.quantity, payload.direction, max_stock)?;

    let mut active: CartItemActive = item.into();
    active.quantity = Set(quantity);
    active.updated_at = Set(Utc::now().into());
    let item = active.update(&txn).await?;

    let line_total =
        pricing::line_total(&catalog::line_input(quantity, product.as_ref(), variant.as_ref()));
    let totals = totals_for(&txn, &cart).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_adjust",
        "cart_items",
        serde_json::json!({ "item_id": item.id, "quantity": quantity }),
    )
    .await;

    let message = match payload.direction {
        Direction::Increase => "Quantity increased successfully",
        Direction::Decrease => "Quantity decreased successfully",
    };
    Ok(ApiResponse::success(
        message,
        AdjustQuantityResponse {
            id: item.id,
            quantity,
            line_total,
            totals,
        },
        Some(Meta::empty()),
    ))
}

pub async fn remove_from_cart(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<CartTotals>> {
    let txn = state.orm.begin().await?;
    let cart = lock_open_cart(state, &txn, user.user_id)
        .await?
        .ok_or(NotFoundError::CartItem)?;

    let result = CartItems::delete_many()
        .filter(ItemCol::Id.eq(item_id))
        .filter(ItemCol::CartId.eq(cart.id))
        .exec(&txn)
        .await?;
    if result.rows_affected == 0 {
        return Err(NotFoundError::CartItem.into());
    }

    let totals = totals_for(&txn, &cart).await?;
    txn.commit().await?;

    audit::record(
        state,
        Some(user.user_id),
        "cart_remove",
        "cart_items",
        serde_json::json!({ "item_id": item_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Item removed from cart",
        totals,
        Some(Meta::empty()),
    ))
}

pub async fn apply_coupon(
    state: &AppState,
    user: &AuthUser,
    payload: ApplyCouponRequest,
) -> AppResult<ApiResponse<CartTotals>> {
    let code = payload.code.trim();
    if code.is_empty() {
        return Err(ValidationError::MissingField("code").into());
    }

    let txn = state.orm.begin().await?;
    let coupon = Coupons::find()
        .filter(CouponCol::Code.eq(code))
        .filter(CouponCol::IsExpired.eq(false))
        .one(&txn)
        .await?
        .ok_or(CouponError::NotFound)?;

    let cart = lock_open_cart(state, &txn, user.user_id)
        .await?
        .ok_or(NotFoundError::Cart)?;

    let lines = load_lines(&txn, cart.id).await?;
    let inputs: Vec<LineInput> = lines.iter().map(CartLineRow::input).collect();
    let now = Utc::now();
    let rule = Coupon::from(coupon);
    if !coupon::is_valid(&rule, pricing::subtotal(&inputs), now) {
        return Err(CouponError::NotApplicable.into());
    }

    let cart_id = cart.id;
    let mut active: CartActive = cart.into();
    active.coupon_id = Set(Some(rule.id));
    active.updated_at = Set(now.into());
    active.update(&txn).await?;

    let totals = pricing::cart_totals(&inputs, Some(&rule), now);
    txn.commit().await?;

    tracing::info!(cart_id = %cart_id, code = %rule.code, "coupon applied");
    audit::record(
        state,
        Some(user.user_id),
        "coupon_apply",
        "carts",
        serde_json::json!({ "cart_id": cart_id, "coupon": rule.code }),
    )
    .await;

    Ok(ApiResponse::success(
        "Coupon applied successfully",
        totals,
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock_error(result: Result<i32, AppError>) -> StockError {
        match result {
            Err(AppError::Stock(err)) => err,
            other => panic!("expected stock error, got {other:?}"),
        }
    }

    #[test]
    fn new_line_within_stock_is_accepted() {
        assert_eq!(quantity_after_add(None, 2, 10).unwrap(), 2);
        assert_eq!(quantity_after_add(None, 10, 10).unwrap(), 10);
    }

    #[test]
    fn merge_beyond_stock_is_rejected() {
        assert_eq!(
            stock_error(quantity_after_add(Some(9), 2, 10)),
            StockError::StockExceeded { max_stock: 10 }
        );
        assert_eq!(quantity_after_add(Some(9), 1, 10).unwrap(), 10);
    }

    #[test]
    fn empty_stock_reports_out_of_stock() {
        assert_eq!(stock_error(quantity_after_add(None, 1, 0)), StockError::OutOfStock);
    }

    #[test]
    fn non_positive_quantity_is_invalid() {
        assert!(matches!(
            quantity_after_add(None, 0, 10),
            Err(AppError::Validation(ValidationError::InvalidQuantity))
        ));
    }

    #[test]
    fn increase_stops_at_max_stock() {
        assert_eq!(quantity_after_adjust(4, Direction::Increase, 5).unwrap(), 5);
        assert_eq!(
            stock_error(quantity_after_adjust(5, Direction::Increase, 5)),
            StockError::StockExceeded { max_stock: 5 }
        );
    }

    #[test]
    fn decrease_stops_at_one() {
        assert_eq!(quantity_after_adjust(2, Direction::Decrease, 5).unwrap(), 1);
        assert!(matches!(
            quantity_after_adjust(1, Direction::Decrease, 5),
            Err(AppError::Validation(ValidationError::MinimumQuantity))
        ));
    }

    #[test]
    fn increase_then_decrease_is_identity() {
        let up = quantity_after_adjust(3, Direction::Increase, 10).unwrap();
        assert_eq!(quantity_after_adjust(up, Direction::Decrease, 10).unwrap(), 3);
    }
}
