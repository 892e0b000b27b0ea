//! Read side of the product catalog.
//!
//! Prices and stock belong to the catalog; this module only resolves them for
//! the connection (usually an open transaction) the caller is working in.

use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    sea_query::{Expr, LockType},
};
use uuid::Uuid;

use crate::{
    entity::{
        products::{Column as ProdCol, Entity as Products, Model as ProductModel},
        variants::{Column as VarCol, Entity as Variants, Model as VariantModel},
    },
    error::{AppResult, StockError},
    pricing::LineInput,
};

/// Size and color requested for a product; `None` matches "no size" / "no color".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VariantSelector {
    pub size_id: Option<Uuid>,
    pub color_id: Option<Uuid>,
}

impl VariantSelector {
    pub fn is_specified(&self) -> bool {
        self.size_id.is_some() || self.color_id.is_some()
    }
}

pub async fn get_product<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<Option<ProductModel>> {
    Ok(Products::find_by_id(id).one(conn).await?)
}

/// First variant of `product_id` matching the selector exactly, NULL for NULL.
pub async fn get_variant<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    selector: VariantSelector,
) -> AppResult<Option<VariantModel>> {
    let mut condition = Condition::all().add(VarCol::ProductId.eq(product_id));
    condition = match selector.size_id {
        Some(size_id) => condition.add(VarCol::SizeId.eq(size_id)),
        None => condition.add(VarCol::SizeId.is_null()),
    };
    condition = match selector.color_id {
        Some(color_id) => condition.add(VarCol::ColorId.eq(color_id)),
        None => condition.add(VarCol::ColorId.is_null()),
    };

    Ok(Variants::find()
        .filter(condition)
        .order_by_asc(VarCol::Id)
        .one(conn)
        .await?)
}

pub async fn get_variant_by_id<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> AppResult<Option<VariantModel>> {
    Ok(Variants::find_by_id(id).one(conn).await?)
}

/// Catalog rows locked for update by [`lock_lines`].
#[derive(Debug, Default)]
pub struct LockedLines {
    products: HashMap<Uuid, ProductModel>,
    variants: HashMap<Uuid, VariantModel>,
}

impl LockedLines {
    pub fn get(
        &self,
        product_id: Option<Uuid>,
        variant_id: Option<Uuid>,
    ) -> (Option<ProductModel>, Option<VariantModel>) {
        (
            product_id.and_then(|id| self.products.get(&id).cloned()),
            variant_id.and_then(|id| self.variants.get(&id).cloned()),
        )
    }
}

/// Locks the product and variant rows of every `(product_id, variant_id)`
/// line for the rest of the transaction.
///
/// All products are locked before any variant, each in ascending id order,
/// so two transactions over overlapping lines always queue instead of
/// deadlocking.
pub async fn lock_lines<C: ConnectionTrait>(
    conn: &C,
    lines: impl IntoIterator<Item = (Option<Uuid>, Option<Uuid>)>,
) -> AppResult<LockedLines> {
    let mut product_ids = BTreeSet::new();
    let mut variant_ids = BTreeSet::new();
    for (product_id, variant_id) in lines {
        product_ids.extend(product_id);
        variant_ids.extend(variant_id);
    }

    let mut locked = LockedLines::default();
    if !product_ids.is_empty() {
        locked.products = Products::find()
            .filter(ProdCol::Id.is_in(product_ids))
            .order_by_asc(ProdCol::Id)
            .lock(LockType::Update)
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
    }
    if !variant_ids.is_empty() {
        locked.variants = Variants::find()
            .filter(VarCol::Id.is_in(variant_ids))
            .order_by_asc(VarCol::Id)
            .lock(LockType::Update)
            .all(conn)
            .await?
            .into_iter()
            .map(|v| (v.id, v))
            .collect();
    }
    Ok(locked)
}

/// Units available for a line: the variant's quantity when there is one,
/// the product's `in_stock_max` otherwise.
pub fn max_stock(product: Option<&ProductModel>, variant: Option<&VariantModel>) -> i32 {
    match (variant, product) {
        (Some(v), _) => v.quantity,
        (None, Some(p)) => p.in_stock_max,
        (None, None) => 0,
    }
}

pub fn line_input(
    quantity: i32,
    product: Option<&ProductModel>,
    variant: Option<&VariantModel>,
) -> LineInput {
    LineInput {
        quantity,
        product_price: product.map(|p| p.price),
        variant_price: variant.and_then(|v| v.price),
    }
}

/// Unit price frozen into a checkout item.
pub fn unit_price(product: Option<&ProductModel>, variant: Option<&VariantModel>) -> Decimal {
    line_input(1, product, variant)
        .unit_price()
        .unwrap_or(Decimal::ZERO)
}

/// Take `quantity` units out of stock, from the variant when the line has one.
pub async fn decrement_stock<C: ConnectionTrait>(
    conn: &C,
    product: Option<&ProductModel>,
    variant: Option<&VariantModel>,
    quantity: i32,
) -> AppResult<()> {
    let available = max_stock(product, variant);
    if available < quantity {
        return Err(StockError::StockExceeded {
            max_stock: available,
        }
        .into());
    }
    adjust_stock(conn, product.map(|p| p.id), variant.map(|v| v.id), -quantity).await
}

/// Give `quantity` units back to stock.
pub async fn release_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Option<Uuid>,
    variant_id: Option<Uuid>,
    quantity: i32,
) -> AppResult<()> {
    adjust_stock(conn, product_id, variant_id, quantity).await
}

async fn adjust_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Option<Uuid>,
    variant_id: Option<Uuid>,
    delta: i32,
) -> AppResult<()> {
    match (variant_id, product_id) {
        (Some(variant_id), _) => {
            Variants::update_many()
                .col_expr(VarCol::Quantity, Expr::col(VarCol::Quantity).add(delta))
                .filter(VarCol::Id.eq(variant_id))
                .exec(conn)
                .await?;
        }
        (None, Some(product_id)) => {
            Products::update_many()
                .col_expr(ProdCol::InStockMax, Expr::col(ProdCol::InStockMax).add(delta))
                .filter(ProdCol::Id.eq(product_id))
                .exec(conn)
                .await?;
        }
        (None, None) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(price: i64, stock: i32) -> ProductModel {
        ProductModel {
            id: Uuid::new_v4(),
            title: "Tee".into(),
            price: Decimal::from(price),
            in_stock_max: stock,
            created_at: Utc::now().into(),
        }
    }

    fn variant(product_id: Uuid, price: Option<i64>, quantity: i32) -> VariantModel {
        VariantModel {
            id: Uuid::new_v4(),
            product_id,
            size_id: Some(Uuid::new_v4()),
            color_id: None,
            price: price.map(Decimal::from),
            quantity,
            created_at: Utc::now().into(),
        }
    }

    #[test]
    fn variant_stock_takes_precedence() {
        let p = product(500, 10);
        let v = variant(p.id, None, 3);
        assert_eq!(max_stock(Some(&p), Some(&v)), 3);
        assert_eq!(max_stock(Some(&p), None), 10);
        assert_eq!(max_stock(None, None), 0);
    }

    #[test]
    fn unit_price_falls_back_to_product_for_unpriced_variant() {
        let p = product(500, 10);
        assert_eq!(unit_price(Some(&p), Some(&variant(p.id, None, 1))), Decimal::from(500));
        assert_eq!(
            unit_price(Some(&p), Some(&variant(p.id, Some(650), 1))),
            Decimal::from(650)
        );
        assert_eq!(unit_price(None, None), Decimal::ZERO);
    }

    #[test]
    fn selector_without_size_or_color_is_unspecified() {
        assert!(!VariantSelector::default().is_specified());
        assert!(
            VariantSelector {
                size_id: None,
                color_id: Some(Uuid::new_v4()),
            }
            .is_specified()
        );
    }
}
