//! Cart and checkout money math.
//!
//! Every total the service reports is produced here so that the discount and
//! the shipping surcharge are applied exactly once, whichever operation asks.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{coupon, models::Coupon};

/// Flat shipping charge added to every payable total.
pub const SHIPPING_SURCHARGE: Decimal = Decimal::from_parts(150, 0, 0, false, 0);

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Prices resolved from the catalog for one cart or checkout line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineInput {
    pub quantity: i32,
    /// `None` when the product has been removed from the catalog.
    pub product_price: Option<Decimal>,
    pub variant_price: Option<Decimal>,
}

impl LineInput {
    /// Variant price when present and non-zero, product price otherwise.
    pub fn unit_price(&self) -> Option<Decimal> {
        let product_price = self.product_price?;
        match self.variant_price {
            Some(price) if price > Decimal::ZERO => Some(price),
            _ => Some(product_price),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CartTotals {
    /// Number of distinct lines.
    pub cart_count: u64,
    /// Sum of quantities across lines.
    pub units: i64,
    pub subtotal: Decimal,
    pub discounted_total: Decimal,
    pub payable: Decimal,
}

impl CartTotals {
    pub fn empty() -> Self {
        Self {
            cart_count: 0,
            units: 0,
            subtotal: Decimal::ZERO,
            discounted_total: Decimal::ZERO,
            payable: payable(Decimal::ZERO),
        }
    }
}

/// Round to cents, half away from zero.
pub fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn line_total(line: &LineInput) -> Decimal {
    match line.unit_price() {
        Some(price) => money(price * Decimal::from(line.quantity)),
        None => Decimal::ZERO,
    }
}

pub fn subtotal<'a>(lines: impl IntoIterator<Item = &'a LineInput>) -> Decimal {
    lines.into_iter().map(line_total).sum()
}

/// Take `percent` off `subtotal`, never going below zero.
pub fn discount_with_percent(subtotal: Decimal, percent: Decimal) -> Decimal {
    let discount = money(subtotal * percent / HUNDRED);
    (subtotal - discount).max(Decimal::ZERO)
}

pub fn apply_discount(subtotal: Decimal, coupon: Option<&Coupon>, now: DateTime<Utc>) -> Decimal {
    match coupon {
        Some(c) if coupon::is_valid(c, subtotal, now) => discount_with_percent(subtotal, c.discount),
        _ => subtotal.max(Decimal::ZERO),
    }
}

pub fn payable(discounted_subtotal: Decimal) -> Decimal {
    discounted_subtotal + SHIPPING_SURCHARGE
}

/// The discount percent that `cart_totals` would actually apply, 0 when the
/// coupon is absent or not applicable.
pub fn effective_discount_percent(
    subtotal: Decimal,
    coupon: Option<&Coupon>,
    now: DateTime<Utc>,
) -> Decimal {
    match coupon {
        Some(c) if coupon::is_valid(c, subtotal, now) => c.discount,
        _ => Decimal::ZERO,
    }
}

pub fn cart_totals(lines: &[LineInput], coupon: Option<&Coupon>, now: DateTime<Utc>) -> CartTotals {
    let subtotal = subtotal(lines);
    let discounted_total = apply_discount(subtotal, coupon, now);
    CartTotals {
        cart_count: lines.len() as u64,
        units: lines.iter().map(|l| i64::from(l.quantity)).sum(),
        subtotal,
        discounted_total,
        payable: payable(discounted_total),
    }
}

/// Subtotal and payable total of a checkout, derived from its frozen item
/// totals, discount percent and shipping charge.
pub fn checkout_totals(
    item_totals: impl IntoIterator<Item = Decimal>,
    discount_percent: Decimal,
    shipping: Decimal,
) -> (Decimal, Decimal) {
    let subtotal: Decimal = item_totals.into_iter().sum();
    let total = discount_with_percent(subtotal, discount_percent) + shipping;
    (subtotal, total)
}
