//! Fixed-point monetary helpers
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Every intermediate step is floor-truncated to two decimal places; half-up
//! or banker's rounding would drift from previously settled matches.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;

use crate::errors::MoneyError;

/// Decimal places carried by every FUEL/BURN amount.
pub const MONEY_DP: u32 = 2;

const FLOAT_NOISE_DP: u32 = 6;

/// Floor-truncate to [`MONEY_DP`] places.
pub fn truncate_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::ToNegativeInfinity)
}

/// `amount * numerator / denominator`, truncated.
///
/// Used for every percentage split (rake, prize podium shares).
pub fn fraction_of(amount: Decimal, numerator: u32, denominator: u32) -> Result<Decimal, MoneyError> {
    if denominator == 0 {
        return Err(MoneyError::DivisionByZero);
    }
    let scaled = amount
        .checked_mul(Decimal::from(numerator))
        .ok_or(MoneyError::Overflow)?;
    let share = scaled
        .checked_div(Decimal::from(denominator))
        .ok_or(MoneyError::Overflow)?;
    Ok(truncate_money(share))
}

/// Truncating division with a typed error instead of a panic.
pub fn checked_div(numerator: Decimal, denominator: Decimal) -> Result<Decimal, MoneyError> {
    if denominator.is_zero() {
        return Err(MoneyError::DivisionByZero);
    }
    numerator
        .checked_div(denominator)
        .map(truncate_money)
        .ok_or(MoneyError::Overflow)
}

/// Overflow-checked sum.
pub fn checked_sum<I>(values: I) -> Result<Decimal, MoneyError>
where
    I: IntoIterator<Item = Decimal>,
{
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(v).ok_or(MoneyError::Overflow))
}

/// Reject zero and negative posting amounts.
pub fn ensure_positive(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount <= Decimal::ZERO {
        return Err(MoneyError::NonPositiveAmount { amount });
    }
    Ok(amount)
}

/// Convert an already-truncated float (e.g. a physics ceiling) to a money value.
///
/// Binary noise below 1e-6 is rounded away first so `95.9_f64` can never
/// floor to `95.89`.
pub fn from_f64_truncated(value: f64) -> Result<Decimal, MoneyError> {
    Decimal::from_f64(value)
        .map(|d| truncate_money(d.round_dp(FLOAT_NOISE_DP)))
        .ok_or_else(|| MoneyError::NotRepresentable {
            value: value.to_string(),
        })
}
