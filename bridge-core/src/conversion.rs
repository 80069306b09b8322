//! Liquid → Planetmint amount conversion
//!
//! The rate is a fixed placeholder until a rate monitor exists. All
//! arithmetic is checked; an overflow is a hard error.

use crate::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Planetmint tokens per Liquid asset unit
pub const CONVERSION_RATE: u64 = 100;

/// Smallest-unit factor of both ledgers' amounts (10^8)
pub const SMALLEST_UNIT_FACTOR: u64 = 100_000_000;

/// Convert a Liquid amount (smallest units) into Planetmint smallest units
///
/// `floor(amount * CONVERSION_RATE / SMALLEST_UNIT_FACTOR)`, computed with a
/// 128-bit intermediate.
pub fn convert(source_amount: u64) -> Result<u64> {
    let product = (source_amount as u128)
        .checked_mul(CONVERSION_RATE as u128)
        .ok_or_else(|| Error::AmountOverflow(format!("{} * {}", source_amount, CONVERSION_RATE)))?;

    let result = product / SMALLEST_UNIT_FACTOR as u128;

    u64::try_from(result)
        .map_err(|_| Error::AmountOverflow(format!("converted amount {} exceeds u64", result)))
}

/// Normalize a display-unit amount reported by the source ledger into
/// smallest units, truncating any sub-unit remainder
pub fn normalize_amount(display_amount: Decimal) -> Result<u64> {
    if display_amount.is_sign_negative() && !display_amount.is_zero() {
        return Err(Error::InvalidAmount(format!(
            "negative amount {}",
            display_amount
        )));
    }

    let scaled = display_amount
        .checked_mul(Decimal::from(SMALLEST_UNIT_FACTOR))
        .ok_or_else(|| Error::AmountOverflow(format!("{} * 10^8", display_amount)))?;

    scaled
        .trunc()
        .to_u64()
        .ok_or_else(|| Error::AmountOverflow(format!("{} exceeds u64", scaled)))
}
