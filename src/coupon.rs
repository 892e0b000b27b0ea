//! Coupon applicability.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::models::Coupon;

/// Whether `coupon` can discount `amount` at `now`.
///
/// A coupon is usable when it is not flagged expired, `now` lies inside its
/// optional `[start_date, end_date]` window (both ends inclusive) and `amount`
/// reaches the minimum qualifying amount.
pub fn is_valid(coupon: &Coupon, amount: Decimal, now: DateTime<Utc>) -> bool {
    if coupon.is_expired {
        return false;
    }
    if coupon.start_date.is_some_and(|start| now < start) {
        return false;
    }
    if coupon.end_date.is_some_and(|end| now > end) {
        return false;
    }
    amount >= coupon.minimum_amount
}
