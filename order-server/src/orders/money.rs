//! Money calculation utilities using rust_decimal for precision
//!
//! All calculations are done using `Decimal` internally, then converted to `f64`
//! for storage/serialization.

use rust_decimal::prelude::*;

/// Rounding strategy for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

/// Tolerance for monetary comparisons (0.01)
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Convert f64 to Decimal for calculation
#[inline]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_else(|| {
        tracing::error!(value = ?value, "Non-finite f64 in monetary calculation, defaulting to zero");
        Decimal::ZERO
    })
}

/// Convert Decimal back to f64 for storage, rounded to 2 decimal places
#[inline]
pub fn to_f64(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

/// Round to the store currency precision (TWD = 0, EUR = 2)
#[inline]
pub fn round_currency(value: Decimal, decimals: i32) -> Decimal {
    let dp = decimals.clamp(0, 4) as u32;
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero)
}

/// Compare two amounts with a 0.01 tolerance
pub fn money_eq(a: f64, b: f64) -> bool {
    (to_decimal(a) - to_decimal(b)).abs() < MONEY_TOLERANCE
}

/// Line subtotal: `(unit price + Σ option modifiers) × quantity`
pub fn line_subtotal(unit_price: f64, modifiers: impl IntoIterator<Item = f64>, quantity: i32) -> Decimal {
    let unit = modifiers
        .into_iter()
        .fold(to_decimal(unit_price), |acc, m| acc + to_decimal(m));
    unit * Decimal::from(quantity)
}

/// Dine-in service charge: `rate% × base`
pub fn service_charge(rate_percent: f64, base: Decimal) -> Decimal {
    if rate_percent <= 0.0 {
        return Decimal::ZERO;
    }
    base * to_decimal(rate_percent) / Decimal::ONE_HUNDRED
}

/// Order monetary fields, all in store currency
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub dish_subtotal: Decimal,
    pub bundle_subtotal: Decimal,
    pub service_charge: Decimal,
    pub total_discount: Decimal,
    pub manual_adjustment: Decimal,
}

impl Totals {
    /// `dish + bundle + service − discount + adjustment`, clamped at 0
    pub fn total(&self) -> Decimal {
        let raw = self.dish_subtotal + self.bundle_subtotal + self.service_charge
            - self.total_discount
            + self.manual_adjustment;
        raw.max(Decimal::ZERO)
    }
}

/// Re-derive an order total from its stored fields
pub fn order_total(
    dish_subtotal: f64,
    bundle_subtotal: f64,
    service_charge: f64,
    total_discount: f64,
    manual_adjustment: f64,
) -> f64 {
    to_f64(
        Totals {
            dish_subtotal: to_decimal(dish_subtotal),
            bundle_subtotal: to_decimal(bundle_subtotal),
            service_charge: to_decimal(service_charge),
            total_discount: to_decimal(total_discount),
            manual_adjustment: to_decimal(manual_adjustment),
        }
        .total(),
    )
}
